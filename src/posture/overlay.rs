use image::{Rgb, RgbImage};

use super::landmarks::{BodyPart, PoseLandmarks};

const GOOD_COLOR: Rgb<u8> = Rgb([100, 233, 127]);
const BAD_COLOR: Rgb<u8> = Rgb([255, 50, 50]);
const JOINT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const HIP_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const MARKER_RADIUS: i32 = 5;
const REFERENCE_LENGTH: i32 = 100;
const BAR_HEIGHT: u32 = 8;

fn put(frame: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.put_pixel(x as u32, y as u32, color);
    }
}

fn fill_circle(frame: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(frame, center.0.saturating_add(dx), center.1.saturating_add(dy), color);
            }
        }
    }
}

/// Liang-Barsky clip of a segment against the frame rectangle. `None` when
/// the segment lies entirely outside.
fn clip_segment(
    width: u32,
    height: u32,
    from: (i32, i32),
    to: (i32, i32),
) -> Option<((i32, i32), (i32, i32))> {
    if width == 0 || height == 0 {
        return None;
    }
    let (x0, y0) = (f64::from(from.0), f64::from(from.1));
    let (dx, dy) = (f64::from(to.0) - x0, f64::from(to.1) - y0);
    let (max_x, max_y) = (f64::from(width - 1), f64::from(height - 1));

    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    for (p, q) in [(-dx, x0), (dx, max_x - x0), (-dy, y0), (dy, max_y - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            t0 = t0.max(t);
        } else {
            t1 = t1.min(t);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| {
        (
            (x0 + t * dx).round().clamp(0.0, max_x) as i32,
            (y0 + t * dy).round().clamp(0.0, max_y) as i32,
        )
    };
    Some((at(t0), at(t1)))
}

// Bresenham, on the part of the segment inside the frame
fn draw_line(frame: &mut RgbImage, from: (i32, i32), to: (i32, i32), color: Rgb<u8>) {
    let Some((from, to)) = clip_segment(frame.width(), frame.height(), from, to) else {
        return;
    };
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(frame, x, y, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Draws the neck and torso segments with their vertical references, plus a
/// bottom bar: full width in the posture colour, overdrawn in red up to the
/// fraction of the alert threshold already spent in bad posture.
pub fn annotate(frame: &mut RgbImage, pose: &PoseLandmarks, good: bool, alert_progress: f64) {
    let (width, height) = frame.dimensions();
    let color = if good { GOOD_COLOR } else { BAD_COLOR };

    let shoulder = pose.get(BodyPart::RightShoulder).to_pixel(width, height);
    let ear = pose.get(BodyPart::RightEar).to_pixel(width, height);
    let hip = pose.get(BodyPart::RightHip).to_pixel(width, height);

    draw_line(frame, shoulder, ear, color);
    draw_line(
        frame,
        shoulder,
        (shoulder.0, shoulder.1.saturating_sub(REFERENCE_LENGTH)),
        color,
    );
    draw_line(frame, hip, shoulder, color);
    draw_line(frame, hip, (hip.0, hip.1.saturating_sub(REFERENCE_LENGTH)), color);

    fill_circle(frame, shoulder, MARKER_RADIUS, JOINT_COLOR);
    fill_circle(frame, ear, MARKER_RADIUS, JOINT_COLOR);
    fill_circle(frame, hip, MARKER_RADIUS, HIP_COLOR);

    let bar_top = height.saturating_sub(BAR_HEIGHT);
    let progress = alert_progress.clamp(0.0, 1.0);
    let progress_end = (f64::from(width) * progress) as u32;
    for y in bar_top..height {
        for x in 0..width {
            let pixel = if !good && x < progress_end { BAD_COLOR } else { color };
            frame.put_pixel(x, y, pixel);
        }
    }
}
