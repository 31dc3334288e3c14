//! Terminal QR code rendering.

use qrcode::QrCode;
use qrcode::render::unicode::Dense1x2;

/// Render `url` as a QR code made of Unicode half-block characters
pub fn render_terminal(url: &str) -> Option<String> {
    let code = QrCode::new(url.as_bytes()).ok()?;
    Some(
        code.render::<Dense1x2>()
            .dark_color(Dense1x2::Light)
            .light_color(Dense1x2::Dark)
            .quiet_zone(true)
            .build(),
    )
}
