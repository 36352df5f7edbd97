//! Bounded page extraction filters
//!
//! The browser agent walks the DOM and feeds raw candidates through these
//! filters. Everything here is pure and capped: the scan runs on the page's
//! UI thread, and an unbounded page must never translate into an unbounded
//! request payload or a janky frame.
//!
//! Viewport bias: content far outside the visible band is skipped — it is
//! both cheaper and what the child actually sees.

/// Text chunks shorter than this are boilerplate (nav labels, buttons).
pub const MIN_CHUNK_LEN: usize = 15;
/// Total text submitted for classification is capped here.
pub const MAX_TEXT_LEN: usize = 3000;
/// Text more than this many px outside the viewport is skipped.
pub const TEXT_VIEWPORT_SLACK: f64 = 300.0;
/// Images more than this many px outside the viewport are skipped.
pub const IMAGE_VIEWPORT_SLACK: f64 = 600.0;
/// Images smaller than this (when dimensions are known) are icons; skip.
pub const MIN_IMAGE_DIM: u32 = 100;
/// Images narrower than this are never blurred (spacer gifs, icons).
pub const BLUR_MIN_WIDTH: u32 = 80;
/// Combined page scans submit at most this many images.
pub const MAX_PAGE_IMAGES: usize = 5;
/// Below this much text (and with no images) a scan resolves safe locally.
pub const MIN_SCAN_TEXT: usize = 30;

/// A visible text node candidate with its viewport-relative bounds.
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub top: f64,
    pub bottom: f64,
}

/// An image candidate. Dimensions are 0 when not yet loaded.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub src: String,
    pub natural_width: u32,
    pub natural_height: u32,
    pub top: f64,
    pub bottom: f64,
}

#[inline]
fn in_band(top: f64, bottom: f64, viewport_height: f64, slack: f64) -> bool {
    bottom >= -slack && top <= viewport_height + slack
}

/// Accumulate visible text, skipping short chunks and off-screen nodes,
/// capped at [`MAX_TEXT_LEN`].
pub fn collect_text(chunks: &[TextChunk], viewport_height: f64) -> String {
    let mut out = String::new();

    for chunk in chunks {
        if out.len() >= MAX_TEXT_LEN {
            break;
        }
        if !in_band(chunk.top, chunk.bottom, viewport_height, TEXT_VIEWPORT_SLACK) {
            continue;
        }
        let trimmed = chunk.text.trim();
        if trimmed.len() <= MIN_CHUNK_LEN {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(trimmed);
    }

    if out.len() > MAX_TEXT_LEN {
        // Cut on a char boundary at or below the cap
        let mut cut = MAX_TEXT_LEN;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }

    out
}

/// Select image URLs worth classifying: http(s) only, not tiny, near the
/// viewport, deduplicated, capped at `max`.
pub fn select_images(candidates: &[ImageCandidate], viewport_height: f64, max: usize) -> Vec<String> {
    let mut seen = Vec::new();

    for img in candidates {
        if seen.len() >= max {
            break;
        }
        if img.natural_width > 0 && img.natural_width < MIN_IMAGE_DIM {
            continue;
        }
        if img.natural_height > 0 && img.natural_height < MIN_IMAGE_DIM {
            continue;
        }
        if !in_band(img.top, img.bottom, viewport_height, IMAGE_VIEWPORT_SLACK) {
            continue;
        }
        let src = img.src.as_str();
        if !(src.starts_with("http://") || src.starts_with("https://")) {
            continue;
        }
        if seen.iter().any(|s: &String| s == src) {
            continue;
        }
        seen.push(src.to_string());
    }

    seen
}

/// Whether the default-safe blur applies to an image of this width.
/// Unknown width (not yet loaded) blurs: safety-first default.
#[inline]
pub fn should_blur(natural_width: u32) -> bool {
    natural_width == 0 || natural_width >= BLUR_MIN_WIDTH
}

/// Whether an extraction result justifies a backend round trip at all.
#[inline]
pub fn worth_scanning(text: &str, image_urls: &[String]) -> bool {
    text.len() >= MIN_SCAN_TEXT || !image_urls.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, top: f64) -> TextChunk {
        TextChunk { text: text.to_string(), top, bottom: top + 20.0 }
    }

    fn image(src: &str, w: u32, h: u32, top: f64) -> ImageCandidate {
        ImageCandidate {
            src: src.to_string(),
            natural_width: w,
            natural_height: h,
            top,
            bottom: top + 200.0,
        }
    }

    #[test]
    fn test_collect_text_skips_short_chunks() {
        let chunks = vec![
            chunk("ok", 0.0),
            chunk("this chunk is long enough to keep", 10.0),
        ];
        let text = collect_text(&chunks, 800.0);
        assert_eq!(text, "this chunk is long enough to keep");
    }

    #[test]
    fn test_collect_text_skips_offscreen() {
        let chunks = vec![
            chunk("way above the viewport, must be skipped", -2000.0),
            chunk("inside the viewport so this one stays", 100.0),
            chunk("way below the viewport, must be skipped", 5000.0),
        ];
        let text = collect_text(&chunks, 800.0);
        assert_eq!(text, "inside the viewport so this one stays");
    }

    #[test]
    fn test_collect_text_caps_total_length() {
        let body = "x".repeat(500);
        let chunks: Vec<TextChunk> = (0..10).map(|i| chunk(&body, i as f64 * 10.0)).collect();
        let text = collect_text(&chunks, 800.0);
        assert!(text.len() <= MAX_TEXT_LEN);
    }

    #[test]
    fn test_collect_text_cap_respects_char_boundary() {
        let body = "é".repeat(400); // 2 bytes each
        let chunks: Vec<TextChunk> = (0..6).map(|i| chunk(&body, i as f64)).collect();
        let text = collect_text(&chunks, 800.0);
        assert!(text.len() <= MAX_TEXT_LEN);
        assert!(text.is_char_boundary(text.len()));
    }

    #[test]
    fn test_select_images_filters_and_caps() {
        let candidates = vec![
            image("https://a.example/1.jpg", 500, 400, 0.0),
            image("https://a.example/icon.png", 32, 32, 0.0),   // tiny
            image("data:image/png;base64,xxxx", 500, 400, 0.0), // wrong scheme
            image("https://a.example/off.jpg", 500, 400, 9000.0), // off screen
            image("https://a.example/1.jpg", 500, 400, 50.0),   // duplicate
            image("https://a.example/2.jpg", 0, 0, 100.0),      // unloaded: kept
            image("https://a.example/3.jpg", 500, 400, 150.0),
            image("https://a.example/4.jpg", 500, 400, 200.0),
            image("https://a.example/5.jpg", 500, 400, 250.0),
            image("https://a.example/6.jpg", 500, 400, 300.0),
        ];
        let urls = select_images(&candidates, 800.0, MAX_PAGE_IMAGES);
        assert_eq!(urls.len(), MAX_PAGE_IMAGES);
        assert_eq!(urls[0], "https://a.example/1.jpg");
        assert!(urls.iter().all(|u| u.starts_with("https://")));
        assert!(!urls.contains(&"https://a.example/icon.png".to_string()));
    }

    #[test]
    fn test_should_blur() {
        assert!(should_blur(0)); // unknown size: blur until proven small
        assert!(should_blur(200));
        assert!(!should_blur(16));
    }

    #[test]
    fn test_worth_scanning() {
        assert!(!worth_scanning("short", &[]));
        assert!(worth_scanning("", &["https://a.example/1.jpg".into()]));
        assert!(worth_scanning(&"t".repeat(40), &[]));
    }
}
