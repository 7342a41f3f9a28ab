use std::ptr;

use gdal::{errors::GdalError, raster::RasterBand, vector::LayerAccess};
use gdal_sys::CPLErr;

pub trait PolygonizeExt {
    /// Writes one polygon per connected region of equal pixel values to
    /// `layer`, storing the value in the field at `field_index`. Pixels that
    /// are zero in `mask` are skipped.
    fn polygonize_into<L: LayerAccess>(
        &self,
        mask: Option<&RasterBand>,
        layer: &L,
        field_index: i32,
    ) -> gdal::errors::Result<()>;
}

impl PolygonizeExt for RasterBand<'_> {
    fn polygonize_into<L: LayerAccess>(
        &self,
        mask: Option<&RasterBand>,
        layer: &L,
        field_index: i32,
    ) -> gdal::errors::Result<()> {
        let rv = unsafe {
            let mask = mask.map_or(ptr::null_mut(), |mask| mask.c_rasterband());
            gdal_sys::GDALPolygonize(
                self.c_rasterband(),
                mask,
                layer.c_layer(),
                field_index,
                ptr::null_mut(),
                None,
                ptr::null_mut(),
            )
        };

        if rv != CPLErr::CE_None {
            return Err(GdalError::CplError {
                class: rv,
                number: 0,
                msg: "GDALPolygonize failed".to_string(),
            });
        }

        Ok(())
    }
}
