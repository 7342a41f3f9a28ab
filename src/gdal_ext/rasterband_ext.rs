use gdal::raster::{Buffer, GdalType, RasterBand};

/// A rectangular pixel region of a raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub offset: (usize, usize),
    pub size: (usize, usize),
}

impl Window {
    pub fn new(offset: (usize, usize), size: (usize, usize)) -> Self {
        Self { offset, size }
    }

    pub fn pixel_count(&self) -> usize {
        self.size.0 * self.size.1
    }

    fn gdal_offset(&self) -> (isize, isize) {
        (self.offset.0 as isize, self.offset.1 as isize)
    }
}

/// Splits a raster of `raster_size` into full-width strips of at most
/// `height` rows.
pub fn strips(raster_size: (usize, usize), height: usize) -> impl Iterator<Item = Window> {
    let height = height.max(1);
    let (width, rows) = raster_size;
    (0..rows.div_ceil(height)).map(move |idx| {
        let row = idx * height;
        Window::new((0, row), (width, height.min(rows - row)))
    })
}

pub trait RasterBandExt {
    fn read_window<T: GdalType + Copy>(&self, window: Window) -> gdal::errors::Result<Buffer<T>>;
    fn write_window<T: GdalType + Copy>(
        &mut self,
        window: Window,
        buffer: &mut Buffer<T>,
    ) -> gdal::errors::Result<()>;
}

impl<'d> RasterBandExt for RasterBand<'d> {
    fn read_window<T: GdalType + Copy>(&self, window: Window) -> gdal::errors::Result<Buffer<T>> {
        self.read_as::<T>(window.gdal_offset(), window.size, window.size, None)
    }

    fn write_window<T: GdalType + Copy>(
        &mut self,
        window: Window,
        buffer: &mut Buffer<T>,
    ) -> gdal::errors::Result<()> {
        self.write(window.gdal_offset(), window.size, buffer)
    }
}
