//! DirectDraw Surface decoder, backed by `image_dds`.
//!
//! `ddsfile` parses the container (legacy FourCC and DX10 headers) and
//! `image_dds` decodes the surface, BCn block compression included. Only the
//! top mip level is returned, always as RGBA.

use super::backend::{Codec, CodecError, FrameDecoder, RawFrame, StillImage};
use image_dds::ddsfile::Dds;
use std::io::Cursor;

pub struct DdsCodec {
    max_pixels: u64,
}

impl DdsCodec {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }
}

impl Codec for DdsCodec {
    fn name(&self) -> &'static str {
        "dds"
    }

    fn open(&self, data: Vec<u8>) -> Result<Box<dyn FrameDecoder>, CodecError> {
        let dds = Dds::read(Cursor::new(&data))
            .map_err(|e| CodecError::Declined(format!("not a DDS file: {e}")))?;
        let (width, height) = (dds.get_width(), dds.get_height());
        if width as u64 * height as u64 > self.max_pixels {
            return Err(CodecError::OutOfMemory(format!(
                "{width}x{height} DDS exceeds the pixel budget"
            )));
        }

        let rgba = image_dds::image_from_dds(&dds, 0)
            .map_err(|e| CodecError::Declined(format!("cannot decode DDS surface: {e}")))?;
        let (w, h) = rgba.dimensions();
        Ok(Box::new(StillImage::new(RawFrame::new(rgba.into_raw(), w, h, 4)?)))
    }
}
