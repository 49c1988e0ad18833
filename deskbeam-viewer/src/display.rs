//! Console presentation of the remote screen.
//!
//! The viewer has no window; it reports stats lines and can save the
//! latest assembled frame as a binary PPM image.

use std::path::Path;

use deskbeam_core::protocol::ConnectionQuality;
use deskbeam_core::rdp::client::{DisplayFrame, FrameStats};
use deskbeam_core::rdp::types::BYTES_PER_PIXEL;

/// Encode a raw BGRA frame as a binary PPM (P6).
pub fn to_ppm(frame: &DisplayFrame) -> Result<Vec<u8>, String> {
    if !frame.encoding.is_raw() {
        return Err(format!("cannot write {:?} frame as PPM", frame.encoding));
    }
    let pixels = frame.width as usize * frame.height as usize;
    if frame.data.len() < pixels * BYTES_PER_PIXEL {
        return Err(format!(
            "frame buffer too small: {} < {}",
            frame.data.len(),
            pixels * BYTES_PER_PIXEL
        ));
    }

    let mut out = format!("P6\n{} {}\n255\n", frame.width, frame.height).into_bytes();
    out.reserve(pixels * 3);
    for px in frame.data.chunks_exact(BYTES_PER_PIXEL).take(pixels) {
        out.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    Ok(out)
}

/// Write `frame` to `path` as PPM.
pub fn save_snapshot(frame: &DisplayFrame, path: &Path) -> std::io::Result<()> {
    let bytes = to_ppm(frame).map_err(std::io::Error::other)?;
    std::fs::write(path, bytes)
}

/// One human-readable status line.
pub fn stats_line(stats: &FrameStats, quality: Option<&ConnectionQuality>) -> String {
    let mut line = format!(
        "{}x{} {:.1} fps, {} frames ({} delta, {} rejected), {}",
        stats.width,
        stats.height,
        stats.fps,
        stats.total_frames,
        stats.delta_frames,
        stats.rejected_frames,
        human_bytes(stats.total_bytes),
    );
    if let Some(q) = quality {
        line.push_str(&format!(
            ", link {} ({}/s, {:.0} ms, quality {})",
            q.rating,
            human_bytes(q.bandwidth as u64),
            q.latency_ms,
            q.quality
        ));
    }
    line
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Whether a frame has anything worth saving.
pub fn is_blank(frame: &DisplayFrame) -> bool {
    frame.width == 0 || frame.height == 0 || !frame.encoding.is_raw()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskbeam_core::QualityRating;
    use deskbeam_core::rdp::types::FrameEncoding;

    fn frame(width: u32, height: u32, data: Vec<u8>) -> DisplayFrame {
        DisplayFrame {
            frame_id: 1,
            width,
            height,
            encoding: FrameEncoding::RawBgra,
            data,
        }
    }

    #[test]
    fn ppm_swaps_bgra_to_rgb() {
        let f = frame(2, 1, vec![1, 2, 3, 255, 10, 20, 30, 255]);
        let ppm = to_ppm(&f).unwrap();
        let header = b"P6\n2 1\n255\n";
        assert_eq!(&ppm[..header.len()], header);
        assert_eq!(&ppm[header.len()..], &[3, 2, 1, 30, 20, 10]);
    }

    #[test]
    fn ppm_rejects_short_buffers() {
        assert!(to_ppm(&frame(4, 4, vec![0; 8])).is_err());
    }

    #[test]
    fn blank_frames() {
        assert!(is_blank(&DisplayFrame::default()));
        assert!(!is_blank(&frame(1, 1, vec![0; 4])));
    }

    #[test]
    fn stats_line_mentions_link_quality() {
        let stats = FrameStats {
            fps: 29.97,
            total_frames: 10,
            delta_frames: 9,
            rejected_frames: 0,
            total_bytes: 2048,
            width: 1280,
            height: 720,
        };
        let plain = stats_line(&stats, None);
        assert!(plain.starts_with("1280x720 30.0 fps"));
        assert!(plain.contains("2.0 KiB"));

        let q = ConnectionQuality {
            quality: 85,
            fps: 30.0,
            bandwidth: 5.0 * 1024.0 * 1024.0,
            latency_ms: 12.0,
            rating: QualityRating::Excellent,
        };
        let line = stats_line(&stats, Some(&q));
        assert!(line.contains("link excellent (5.0 MiB/s, 12 ms, quality 85)"));
    }
}
