mod bands;
mod quality;
mod scene;

pub use bands::{Band, Scene};
pub use quality::QualityBand;
pub use scene::SceneId;
