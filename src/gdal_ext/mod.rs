mod polygonize_ext;
mod rasterband_ext;

pub use polygonize_ext::PolygonizeExt;
pub use rasterband_ext::{strips, RasterBandExt, Window};
