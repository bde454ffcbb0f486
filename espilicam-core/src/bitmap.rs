//! Minimal BMP565 file header: BITMAPFILEHEADER, BITMAPINFOHEADER and the
//! three BI_BITFIELDS channel masks, followed directly by top-down RGB565 rows.

/// Total size of the header in bytes
pub const BMP565_HEADER_SIZE: usize = 14 + 40 + 12;

const BI_BITFIELDS: u32 = 3;
/// 72 DPI
const PIXELS_PER_METER: u32 = 2835;

const RED_MASK: u32 = 0xF800;
const GREEN_MASK: u32 = 0x07E0;
const BLUE_MASK: u32 = 0x001F;

/// Build the header for a `width` x `height` RGB565 image
pub fn bmp565_header(width: u32, height: u32) -> [u8; BMP565_HEADER_SIZE] {
    let image_size = width * height * 2;
    let file_size = BMP565_HEADER_SIZE as u32 + image_size;

    let mut header = [0u8; BMP565_HEADER_SIZE];
    let mut w = FieldWriter::new(&mut header);

    // File header
    w.bytes(b"BM");
    w.u32(file_size);
    w.u32(0);
    w.u32(BMP565_HEADER_SIZE as u32);

    // Info header
    w.u32(40);
    w.u32(width);
    // Negative height: rows are stored top to bottom, the order they are streamed
    w.u32((-(height as i32)) as u32);
    w.u16(1);
    w.u16(16);
    w.u32(BI_BITFIELDS);
    w.u32(image_size);
    w.u32(PIXELS_PER_METER);
    w.u32(PIXELS_PER_METER);
    w.u32(0);
    w.u32(0);

    w.u32(RED_MASK);
    w.u32(GREEN_MASK);
    w.u32(BLUE_MASK);

    header
}

struct FieldWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    fn u16(&mut self, value: u16) {
        self.bytes(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }
}
