//! Pixel conversion for the encoder input path.
//!
//! RGBA-family frame → nearest-neighbour resize → planar I420 (BT.601,
//! limited range) → NV12 with interleaved chroma. Plain integer math;
//! the buffers are reused across frames.

use crate::pipeline::types::{FrameImage, Resolution};

// ── I420Buffer ───────────────────────────────────────────────────

/// Planar 4:2:0: Y plane, then U, then V.
pub struct I420Buffer {
    data: Vec<u8>,
    resolution: Resolution,
}

impl I420Buffer {
    pub fn new(resolution: Resolution) -> Self {
        let (y, c) = plane_sizes(resolution);
        Self {
            data: vec![0u8; y + 2 * c],
            resolution,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn y_plane(&self) -> &[u8] {
        let (y, _) = plane_sizes(self.resolution);
        &self.data[..y]
    }

    pub fn u_plane(&self) -> &[u8] {
        let (y, c) = plane_sizes(self.resolution);
        &self.data[y..y + c]
    }

    pub fn v_plane(&self) -> &[u8] {
        let (y, c) = plane_sizes(self.resolution);
        &self.data[y + c..]
    }

    fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        let (y, c) = plane_sizes(self.resolution);
        let (luma, chroma) = self.data.split_at_mut(y);
        let (u, v) = chroma.split_at_mut(c);
        (luma, u, v)
    }
}

// ── Nv12Buffer ───────────────────────────────────────────────────

/// Semi-planar 4:2:0: Y plane, then interleaved UV pairs.
pub struct Nv12Buffer {
    data: Vec<u8>,
    resolution: Resolution,
}

impl Nv12Buffer {
    pub fn new(resolution: Resolution) -> Self {
        let (y, c) = plane_sizes(resolution);
        Self {
            data: vec![0u8; y + 2 * c],
            resolution,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn y_plane(&self) -> &[u8] {
        let (y, _) = plane_sizes(self.resolution);
        &self.data[..y]
    }

    pub fn uv_plane(&self) -> &[u8] {
        let (y, _) = plane_sizes(self.resolution);
        &self.data[y..]
    }
}

/// Byte size of the luma plane and of one chroma plane.
fn plane_sizes(r: Resolution) -> (usize, usize) {
    let (w, h) = (r.width as usize, r.height as usize);
    (w * h, w.div_ceil(2) * h.div_ceil(2))
}

// ── Conversions ──────────────────────────────────────────────────

/// Nearest-neighbour resize. Returns `None` when no resize is needed.
pub fn resize_nearest(src: &FrameImage, target: Resolution) -> Option<FrameImage> {
    if src.resolution() == target {
        return None;
    }
    let bpp = src.format().bytes_per_pixel();
    let (sw, sh) = (src.width() as usize, src.height() as usize);
    let (tw, th) = (target.width as usize, target.height as usize);
    let mut out = vec![0u8; tw * th * bpp];

    if sw > 0 && sh > 0 {
        let src_data = src.data();
        for (ty, row) in out.chunks_exact_mut((tw * bpp).max(1)).enumerate() {
            let sy = ty * sh / th;
            for tx in 0..tw {
                let sx = tx * sw / tw;
                let at = (sy * sw + sx) * bpp;
                row[tx * bpp..(tx + 1) * bpp].copy_from_slice(&src_data[at..at + bpp]);
            }
        }
    }
    FrameImage::from_packed(target.width, target.height, src.format(), out)
}

/// RGBA-family image to I420. Chroma is the mean of each 2x2 block.
pub fn rgb_to_i420(src: &FrameImage, dst: &mut I420Buffer) {
    let res = dst.resolution();
    debug_assert_eq!(src.resolution(), res);
    let (w, h) = (res.width as usize, res.height as usize);
    let cw = w.div_ceil(2);
    let (y_plane, u_plane, v_plane) = dst.planes_mut();

    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = src.rgb(x as u32, y as u32);
            y_plane[y * w + x] = luma(r, g, b);
        }
    }

    for cy in 0..h.div_ceil(2) {
        for cx in 0..cw {
            let (mut r, mut g, mut b, mut n) = (0u32, 0u32, 0u32, 0u32);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let (x, y) = (cx * 2 + dx, cy * 2 + dy);
                if x < w && y < h {
                    let (pr, pg, pb) = src.rgb(x as u32, y as u32);
                    r += pr as u32;
                    g += pg as u32;
                    b += pb as u32;
                    n += 1;
                }
            }
            let (r, g, b) = ((r / n) as u8, (g / n) as u8, (b / n) as u8);
            u_plane[cy * cw + cx] = chroma_u(r, g, b);
            v_plane[cy * cw + cx] = chroma_v(r, g, b);
        }
    }
}

/// Copy luma and interleave the U and V planes into NV12.
pub fn i420_to_nv12(src: &I420Buffer, dst: &mut Nv12Buffer) {
    debug_assert_eq!(src.resolution(), dst.resolution());
    let (y_len, _) = plane_sizes(src.resolution());
    let (luma, uv) = dst.data.split_at_mut(y_len);
    luma.copy_from_slice(src.y_plane());
    for ((pair, u), v) in uv
        .chunks_exact_mut(2)
        .zip(src.u_plane())
        .zip(src.v_plane())
    {
        pair[0] = *u;
        pair[1] = *v;
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

fn chroma_u(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

fn chroma_v(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

// ── FrameConverter ───────────────────────────────────────────────

/// Reusable RGBA → NV12 path for one output size.
pub struct FrameConverter {
    i420: I420Buffer,
    nv12: Nv12Buffer,
}

impl FrameConverter {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            i420: I420Buffer::new(resolution),
            nv12: Nv12Buffer::new(resolution),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.nv12.resolution()
    }

    /// Scale and convert `frame`; the result lives until the next call.
    pub fn convert(&mut self, frame: &FrameImage) -> &[u8] {
        let scaled = resize_nearest(frame, self.resolution());
        rgb_to_i420(scaled.as_ref().unwrap_or(frame), &mut self.i420);
        i420_to_nv12(&self.i420, &mut self.nv12);
        self.nv12.as_bytes()
    }
}
