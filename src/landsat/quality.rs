use super::scene::{IdFormat, SceneId};

/// Bit layout of the per-pixel quality band, which changed between archive
/// collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QualityBand {
    /// Pre-collection `BQA`: cirrus confidence in bits 12-13, cloud
    /// confidence in bits 14-15.
    PreCollection,
    /// Collection 1 `BQA`: cloud flag in bit 4, cirrus confidence in bits
    /// 11-12.
    Collection1,
    /// Collection 2 `QA_PIXEL`: cirrus flag in bit 2, cloud flag in bit 3.
    Collection2,
}

const FILL: u16 = 1;
const HIGH_CONFIDENCE: u16 = 0b11;

impl QualityBand {
    pub fn for_scene(id: &SceneId) -> Self {
        match id.format() {
            IdFormat::PreCollection { .. } => QualityBand::PreCollection,
            IdFormat::Collection { collection: 1, .. } => QualityBand::Collection1,
            IdFormat::Collection { .. } => QualityBand::Collection2,
        }
    }

    pub fn is_fill(self, qa: u16) -> bool {
        qa & FILL != 0
    }

    /// Returns `true` for pixels covered by high-confidence cloud or cirrus.
    pub fn is_obscured(self, qa: u16) -> bool {
        match self {
            QualityBand::PreCollection => {
                let cirrus = (qa >> 12) & 0b11;
                let cloud = (qa >> 14) & 0b11;
                cirrus == HIGH_CONFIDENCE || cloud == HIGH_CONFIDENCE
            }
            QualityBand::Collection1 => {
                let cloud = (qa >> 4) & 1;
                let cirrus = (qa >> 11) & 0b11;
                cloud != 0 || cirrus == HIGH_CONFIDENCE
            }
            QualityBand::Collection2 => {
                let cirrus = (qa >> 2) & 1;
                let cloud = (qa >> 3) & 1;
                cirrus != 0 || cloud != 0
            }
        }
    }

    /// Whether the pixel carries a usable surface observation.
    pub fn is_clear(self, qa: u16) -> bool {
        !self.is_fill(qa) && !self.is_obscured(qa)
    }
}
