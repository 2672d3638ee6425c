//! Stream annotation
//!
//! Draws detection boxes, a per-item status bar and the pending countdown
//! on a copy of the frame.

use crate::compliance::{ComplianceStatus, ItemStatus, SUBJECT_LABEL};
use crate::detector::{BoundingBox, DetectionResult};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const GREEN: Rgb<u8> = Rgb([0, 200, 0]);
const RED: Rgb<u8> = Rgb([220, 0, 0]);
const YELLOW: Rgb<u8> = Rgb([230, 200, 0]);
const ORANGE: Rgb<u8> = Rgb([255, 140, 0]);
const BLUE: Rgb<u8> = Rgb([30, 120, 255]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

const STATUS_BAR_HEIGHT: u32 = 16;
const COUNTDOWN_HEIGHT: u32 = 6;

pub(crate) fn item_color(status: ItemStatus) -> Rgb<u8> {
    match status {
        ItemStatus::Present => GREEN,
        ItemStatus::Missing => RED,
        ItemStatus::NotApplicable => YELLOW,
    }
}

/// Render the annotated frame
///
/// `progress` is the matured fraction of a pending violation in [0, 1].
pub fn render(
    image: &RgbImage,
    detections: &DetectionResult,
    compliance: &ComplianceStatus,
    progress: Option<f32>,
) -> RgbImage {
    let mut canvas = image.clone();
    if canvas.width() == 0 || canvas.height() == 0 {
        return canvas;
    }

    for detection in &detections.detections {
        let color = if detection.label == SUBJECT_LABEL {
            BLUE
        } else if compliance.items.iter().any(|(item, _)| item.label() == detection.label) {
            GREEN
        } else {
            WHITE
        };
        if let Some(rect) = clip(&detection.bbox, canvas.width(), canvas.height()) {
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }

    draw_status_bar(&mut canvas, compliance);

    if let Some(progress) = progress {
        let width = (canvas.width() as f32 * progress.clamp(0.0, 1.0)) as u32;
        let top = STATUS_BAR_HEIGHT.min(canvas.height().saturating_sub(1));
        let height = COUNTDOWN_HEIGHT.min(canvas.height() - top);
        if width > 0 && height > 0 {
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(0, top as i32).of_size(width, height),
                ORANGE,
            );
        }
    }

    canvas
}

fn draw_status_bar(canvas: &mut RgbImage, compliance: &ComplianceStatus) {
    let count = compliance.items.len() as u32;
    if count == 0 {
        return;
    }
    let cell_width = (canvas.width() / count).max(1);
    let height = STATUS_BAR_HEIGHT.min(canvas.height());

    for (index, (_, status)) in compliance.items.iter().enumerate() {
        let x = index as u32 * cell_width;
        if x >= canvas.width() {
            break;
        }
        let width = cell_width.min(canvas.width() - x);
        draw_filled_rect_mut(
            canvas,
            Rect::at(x as i32, 0).of_size(width, height),
            item_color(*status),
        );
    }
}

/// Clip a box to the image, `None` when nothing remains
fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<Rect> {
    let x1 = bbox.x1.min(bbox.x2).max(0.0) as u32;
    let y1 = bbox.y1.min(bbox.y2).max(0.0) as u32;
    let x2 = (bbox.x1.max(bbox.x2).max(0.0) as u32).min(width);
    let y2 = (bbox.y1.max(bbox.y2).max(0.0) as u32).min(height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1 as i32, y1 as i32).of_size(x2 - x1, y2 - y1))
}
