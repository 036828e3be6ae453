use crate::types::{BodyLandmarks, BodyPart, HandLandmarks, Point2D};

pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

pub const BODY_CONNECTIONS: &[(BodyPart, BodyPart)] = &[
    (BodyPart::LeftShoulder, BodyPart::RightShoulder),
    (BodyPart::LeftShoulder, BodyPart::LeftElbow),
    (BodyPart::LeftElbow, BodyPart::LeftWrist),
    (BodyPart::RightShoulder, BodyPart::RightElbow),
    (BodyPart::RightElbow, BodyPart::RightWrist),
    (BodyPart::LeftShoulder, BodyPart::LeftHip),
    (BodyPart::RightShoulder, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::RightHip),
    (BodyPart::LeftHip, BodyPart::LeftKnee),
    (BodyPart::LeftKnee, BodyPart::LeftAnkle),
    (BodyPart::RightHip, BodyPart::RightKnee),
    (BodyPart::RightKnee, BodyPart::RightAnkle),
];

pub const SKELETON_LINE_THICKNESS: i32 = 5;
/// Normalized coordinates drawn; landmarks further off-frame are skipped.
const DRAWABLE_RANGE: std::ops::RangeInclusive<f32> = -1.0..=2.0;
const BODY_COLOR: [u8; 4] = [34, 197, 94, 255];
const HAND_LINE_COLOR: [u8; 4] = [56, 189, 248, 255];
const HAND_POINT_COLOR: [u8; 4] = [248, 113, 113, 255];
const ALERT_COLOR: [u8; 4] = [239, 68, 68, 255];
const PIP_COLOR: [u8; 4] = [250, 204, 21, 255];
const PIP_RADIUS: i32 = 10;

/// RGBA pixel buffer that clips every write to its bounds.
pub struct Canvas<'a> {
    buffer: &'a mut [u8],
    width: u32,
    height: u32,
}

impl<'a> Canvas<'a> {
    pub fn new(buffer: &'a mut [u8], width: u32, height: u32) -> Self {
        Self {
            buffer,
            width,
            height,
        }
    }

    /// Pixel position of a landmark, or `None` for non-finite points and points
    /// outside [`DRAWABLE_RANGE`].
    fn project(&self, point: Point2D) -> Option<(i32, i32)> {
        let drawable = |v: f32| v.is_finite() && DRAWABLE_RANGE.contains(&v);
        if !drawable(point.x) || !drawable(point.y) {
            return None;
        }
        let (x, y) = point.to_pixels(self.width, self.height);
        Some((x as i32, y as i32))
    }

    pub fn draw_body(&mut self, body: &BodyLandmarks) {
        for &(a, b) in BODY_CONNECTIONS {
            let ends = body
                .get(a)
                .and_then(|pa| self.project(pa))
                .zip(body.get(b).and_then(|pb| self.project(pb)));
            if let Some((pa, pb)) = ends {
                self.line(pa, pb, BODY_COLOR, SKELETON_LINE_THICKNESS);
            }
        }
    }

    pub fn draw_hand(&mut self, hand: &HandLandmarks) {
        let points: Vec<Option<(i32, i32)>> =
            hand.points().iter().map(|p| self.project(*p)).collect();
        if points.len() < 2 {
            return;
        }

        for &(a, b) in HAND_CONNECTIONS {
            if let (Some(&Some(pa)), Some(&Some(pb))) = (points.get(a), points.get(b)) {
                self.line(pa, pb, HAND_LINE_COLOR, SKELETON_LINE_THICKNESS);
            }
        }

        let point_radius = (SKELETON_LINE_THICKNESS / 2).max(2) + 2;
        for point in points.into_iter().flatten() {
            self.circle(point, point_radius, HAND_POINT_COLOR);
        }
    }

    /// Frame-wide border shown while the stop signal is up.
    pub fn draw_alert_border(&mut self, thickness: i32) {
        let (w, h) = (self.width as i32, self.height as i32);
        self.fill_rect(0, 0, w, thickness, ALERT_COLOR);
        self.fill_rect(0, h - thickness, w, h, ALERT_COLOR);
        self.fill_rect(0, 0, thickness, h, ALERT_COLOR);
        self.fill_rect(w - thickness, 0, w, h, ALERT_COLOR);
    }

    /// One dot per signalled point along the top-left edge.
    pub fn draw_score_pips(&mut self, points: u32) {
        let spacing = PIP_RADIUS * 3;
        for idx in 0..points as i32 {
            let center = (spacing + idx * spacing, spacing);
            self.circle(center, PIP_RADIUS, PIP_COLOR);
        }
    }

    fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: [u8; 4]) {
        for y in y0.max(0)..y1 {
            for x in x0.max(0)..x1 {
                self.put_pixel(x, y, color);
            }
        }
    }

    fn line(&mut self, from: (i32, i32), to: (i32, i32), color: [u8; 4], thickness: i32) {
        let (mut x0, mut y0) = from;
        let (x1, y1) = to;
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = (thickness.max(1) - 1) / 2;

        loop {
            if radius > 0 {
                self.circle((x0, y0), radius, color);
            } else {
                self.put_pixel(x0, y0, color);
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn circle(&mut self, center: (i32, i32), radius: i32, color: [u8; 4]) {
        let (cx, cy) = center;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return;
        }
        let idx = ((y as u32 * self.width + x as u32) as usize) * 4;
        if let Some(px) = self.buffer.get_mut(idx..idx + 4) {
            px.copy_from_slice(&color);
        }
    }
}
