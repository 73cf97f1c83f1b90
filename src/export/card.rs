//! Share card rendering: a fixed 600px-wide PNG template.

use std::io::Cursor;

use image::{
    imageops::{self, FilterType},
    DynamicImage, ImageError, ImageFormat, Rgba, RgbaImage,
};

use super::glyphs::{draw_centered, draw_text, fit, text_width, GLYPH_H};
use crate::{
    history::search_date,
    scans::model::{Nutrient, Scan},
};

pub const CARD_WIDTH: u32 = 600;
const PAD: u32 = 32;
const INNER: u32 = CARD_WIDTH - 2 * PAD;
const PHOTO_H: u32 = 240;
const GAP: u32 = 16;
const TILE_H: u32 = 72;
const LINE_H: u32 = 22;

const FROM: [u8; 3] = [0x15, 0x80, 0x3d];
const TO: [u8; 3] = [0x22, 0xc5, 0x5e];
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SOFT: Rgba<u8> = Rgba([220, 252, 231, 255]);

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round() as u8
}

fn gradient(width: u32, height: u32) -> RgbaImage {
    let span = (width + height).max(1) as f32;
    RgbaImage::from_fn(width, height, |x, y| {
        let t = (x + y) as f32 / span;
        Rgba([
            lerp(FROM[0], TO[0], t),
            lerp(FROM[1], TO[1], t),
            lerp(FROM[2], TO[2], t),
            255,
        ])
    })
}

/// Lightens a rectangle toward white by `amount` (0..1).
fn wash(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, amount: f32) {
    for py in y..(y + h).min(img.height()) {
        for px in x..(x + w).min(img.width()) {
            let p = img.get_pixel_mut(px, py);
            for c in 0..3 {
                p.0[c] = lerp(p.0[c], 255, amount);
            }
        }
    }
}

fn metric_value(scan: &Scan, n: Nutrient) -> String {
    let v = scan.nutrition_facts.summary().get(n);
    match n {
        Nutrient::CaloriesKcal => format!("{:.0}", v),
        Nutrient::SodiumMg => format!("{:.0}MG", v),
        _ => format!("{:.1}G", v),
    }
}

fn metric_label(n: Nutrient) -> &'static str {
    match n {
        Nutrient::CaloriesKcal => "CALORIES",
        Nutrient::ProteinG => "PROTEIN",
        Nutrient::FatG => "FAT",
        Nutrient::CarbsG => "CARBS",
        Nutrient::SodiumMg => "SODIUM",
        Nutrient::FiberG => "FIBER",
    }
}

fn card_height(has_photo: bool, items: usize) -> u32 {
    let mut h = PAD;
    h += GLYPH_H * 4 + 10 + GLYPH_H * 2 + 24; // title + subtitle
    if has_photo {
        h += PHOTO_H + 24;
    }
    h += 2 * TILE_H + GAP + 24;
    h += GLYPH_H * 2 + 16; // date line
    h += items.max(1) as u32 * LINE_H + 16;
    h += 1 + 20 + GLYPH_H * 2 + PAD; // divider + attribution
    h
}

/// Renders the share card. `attribution` is the SPPG / owner name shown at the
/// bottom; the photo is optional so a card can still be produced when the stored
/// image cannot be fetched.
pub fn render_share_card(
    scan: &Scan,
    photo: Option<&DynamicImage>,
    attribution: Option<&str>,
) -> Result<Vec<u8>, ImageError> {
    let height = card_height(photo.is_some(), scan.menu_items.len());
    let mut img = gradient(CARD_WIDTH, height);
    let mut y = PAD;

    draw_centered(&mut img, y, "NUTRITION SCAN", 4, WHITE);
    y += GLYPH_H * 4 + 10;
    draw_centered(&mut img, y, "AI-POWERED FOOD ANALYSIS", 2, SOFT);
    y += GLYPH_H * 2 + 24;

    if let Some(photo) = photo {
        let fitted = photo.resize_to_fill(INNER, PHOTO_H, FilterType::Triangle).to_rgba8();
        imageops::overlay(&mut img, &fitted, PAD as i64, y as i64);
        y += PHOTO_H + 24;
    }

    let tile_w = (INNER - 2 * GAP) / 3;
    for (i, n) in Nutrient::ALL.iter().enumerate() {
        let col = i as u32 % 3;
        let row = i as u32 / 3;
        let tx = PAD + col * (tile_w + GAP);
        let ty = y + row * (TILE_H + GAP / 2);
        wash(&mut img, tx, ty, tile_w, TILE_H, 0.15);

        let value = metric_value(scan, *n);
        let vx = tx + tile_w.saturating_sub(text_width(&value, 3)) / 2;
        draw_text(&mut img, vx, ty + 14, &value, 3, WHITE);
        let label = metric_label(*n);
        let lx = tx + tile_w.saturating_sub(text_width(label, 2)) / 2;
        draw_text(&mut img, lx, ty + 14 + GLYPH_H * 3 + 10, label, 2, SOFT);
    }
    y += 2 * TILE_H + GAP + 24;

    let date_line = format!("MENU MBG HARI INI: {}", search_date(scan.scan_date));
    draw_centered(&mut img, y, &date_line, 2, SOFT);
    y += GLYPH_H * 2 + 16;

    if scan.menu_items.is_empty() {
        draw_centered(&mut img, y, "-", 2, WHITE);
    }
    for item in &scan.menu_items {
        let line = fit(
            &format!("{} ({:.0}G)", item.name, item.estimated_grams),
            2,
            INNER,
        );
        draw_centered(&mut img, y, &line, 2, WHITE);
        y += LINE_H;
    }
    if scan.menu_items.is_empty() {
        y += LINE_H;
    }
    y += 16;

    wash(&mut img, PAD, y, INNER, 1, 0.2);
    y += 1 + 20;
    let footer = fit(
        &format!("SPPG {}", attribution.unwrap_or("User")),
        2,
        INNER,
    );
    draw_centered(&mut img, y, &footer, 2, SOFT);

    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Download name for a card, e.g. `nutrition-card-2025-10-09.png`.
pub fn card_file_name(scan: &Scan) -> String {
    format!("nutrition-card-{}.png", scan.scan_date.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scans::fixtures::scan;
    use uuid::Uuid;

    #[test]
    fn renders_png_600_wide() {
        let s = scan(Uuid::new_v4(), &["Nasi Putih", "Telur Rebus"], 0);
        let png = render_share_card(&s, None, Some("Dapur Sehat")).unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);

        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), CARD_WIDTH);
        assert_eq!(decoded.height(), card_height(false, 2));
        let corner = decoded.to_rgba8().get_pixel(0, 0).0;
        assert_eq!(&corner[..3], &FROM);
    }

    #[test]
    fn photo_makes_card_taller() {
        let s = scan(Uuid::new_v4(), &["Nasi Putih"], 0);
        let photo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 48, Rgba([200, 30, 30, 255])));
        let png = render_share_card(&s, Some(&photo), None).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.height(), card_height(true, 1));
        let inside_photo = decoded.get_pixel(PAD + 10, PAD + GLYPH_H * 6 + 34 + 10).0;
        let want = [200u8, 30, 30];
        for c in 0..3 {
            assert!(inside_photo[c].abs_diff(want[c]) <= 2);
        }
    }

    #[test]
    fn file_name_uses_scan_date() {
        let s = scan(Uuid::new_v4(), &["Nasi"], 0);
        assert_eq!(card_file_name(&s), "nutrition-card-2025-10-09.png");
    }
}
