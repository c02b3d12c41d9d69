//! CSS colour text to the bridge's native gamma-corrected chromaticity.
//!
//! The bridge does not speak RGB. It takes a CIE 1931 chromaticity pair plus
//! a 1..=254 brightness level, so every colour the outside world hands us -
//! a name, a hex literal, an `rgb()`/`hsl()` functional form - is decoded to
//! 8-bit RGB, linearized through the sRGB transfer curve, projected through
//! a fixed wide-gamut sensor matrix to XYZ, and collapsed to (x, y).
//!
//! Everything here is pure; bad input yields `None`, never a panic. An alpha
//! channel, when present, is repurposed as a brightness multiplier.

/// Decoded 8-bit colour with a 0..=1 alpha.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub alpha: f64,
}

/// The bridge's native colour triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XyBrightness {
    pub x: f64,
    pub y: f64,
    /// Native brightness level; 0 is not legal on the wire, so the floor is 1.
    pub brightness: u8,
}

/// Chromaticity used when the input collapses to pure black: D65 neutral
/// white, instead of dividing by a zero tristimulus sum.
const NEUTRAL_WHITE: (f64, f64) = (0.3127, 0.3290);

/// Translate colour text into the native triple. `None` means the text does
/// not parse as a colour.
pub fn translate(text: &str) -> Option<XyBrightness> {
    let rgba = parse_css(text)?;

    let r = gamma_expand(rgba.r as f64 / 255.0);
    let g = gamma_expand(rgba.g as f64 / 255.0);
    let b = gamma_expand(rgba.b as f64 / 255.0);

    // Wide-gamut RGB -> XYZ, D65.
    let x_t = r * 0.664511 + g * 0.154324 + b * 0.162028;
    let y_t = r * 0.283881 + g * 0.668433 + b * 0.047685;
    let z_t = r * 0.000088 + g * 0.072310 + b * 0.986039;

    let sum = x_t + y_t + z_t;
    let (x, y) = if sum == 0.0 {
        NEUTRAL_WHITE
    } else {
        (x_t / sum, y_t / sum)
    };

    let level = rgba.r.max(rgba.g).max(rgba.b) as f64 / 255.0 * rgba.alpha;
    let brightness = ((level * 254.0).round() as u8).max(1);

    Some(XyBrightness { x, y, brightness })
}

/// sRGB gamma expansion: linear segment below the 0.04045 knee, power law
/// above it.
fn gamma_expand(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Parse a CSS colour expression: a named colour, `#rgb[a]`/`#rrggbb[aa]`
/// hex, or a comma-form `rgb()`/`rgba()`/`hsl()`/`hsla()` function.
pub fn parse_css(text: &str) -> Option<Rgba> {
    let text = text.trim().to_ascii_lowercase();

    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(args) = strip_function(&text, "rgba").or_else(|| strip_function(&text, "rgb")) {
        return parse_rgb_args(args);
    }
    if let Some(args) = strip_function(&text, "hsla").or_else(|| strip_function(&text, "hsl")) {
        return parse_hsl_args(args);
    }

    NAMED_COLORS
        .binary_search_by_key(&text.as_str(), |(name, _)| name)
        .ok()
        .map(|idx| {
            let [r, g, b] = NAMED_COLORS[idx].1;
            Rgba { r, g, b, alpha: 1.0 }
        })
}

fn strip_function<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .trim_end()
        .strip_suffix(')')
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |c: u8| -> u8 { (c as char).to_digit(16).unwrap() as u8 };
    let bytes = hex.as_bytes();

    let (r, g, b, a) = match hex.len() {
        // #rgb / #rgba: each digit doubles.
        3 | 4 => {
            let d = |i: usize| nibble(bytes[i]) * 17;
            let a = if hex.len() == 4 { d(3) } else { 255 };
            (d(0), d(1), d(2), a)
        }
        6 | 8 => {
            let d = |i: usize| nibble(bytes[i]) * 16 + nibble(bytes[i + 1]);
            let a = if hex.len() == 8 { d(6) } else { 255 };
            (d(0), d(2), d(4), a)
        }
        _ => return None,
    };

    Some(Rgba {
        r,
        g,
        b,
        alpha: a as f64 / 255.0,
    })
}

fn parse_rgb_args(args: &str) -> Option<Rgba> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let channel = |s: &str| -> Option<u8> {
        if let Some(pct) = s.strip_suffix('%') {
            let v: f64 = pct.trim().parse().ok()?;
            Some((v.clamp(0.0, 100.0) / 100.0 * 255.0).round() as u8)
        } else {
            let v: f64 = s.parse().ok()?;
            Some(v.clamp(0.0, 255.0).round() as u8)
        }
    };

    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let alpha = match parts.get(3) {
        Some(s) => parse_alpha(s)?,
        None => 1.0,
    };

    Some(Rgba { r, g, b, alpha })
}

fn parse_hsl_args(args: &str) -> Option<Rgba> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let h: f64 = parts[0].strip_suffix("deg").unwrap_or(parts[0]).trim().parse().ok()?;
    let s: f64 = parts[1].strip_suffix('%')?.trim().parse().ok()?;
    let l: f64 = parts[2].strip_suffix('%')?.trim().parse().ok()?;
    let alpha = match parts.get(3) {
        Some(a) => parse_alpha(a)?,
        None => 1.0,
    };

    let h = h.rem_euclid(360.0);
    let s = (s / 100.0).clamp(0.0, 1.0);
    let l = (l / 100.0).clamp(0.0, 1.0);

    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;

    let (r1, g1, b1) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let to_byte = |v: f64| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    Some(Rgba {
        r: to_byte(r1),
        g: to_byte(g1),
        b: to_byte(b1),
        alpha,
    })
}

fn parse_alpha(s: &str) -> Option<f64> {
    if let Some(pct) = s.strip_suffix('%') {
        let v: f64 = pct.trim().parse().ok()?;
        Some((v / 100.0).clamp(0.0, 1.0))
    } else {
        let v: f64 = s.parse().ok()?;
        Some(v.clamp(0.0, 1.0))
    }
}

/// CSS named colours, sorted for binary search.
static NAMED_COLORS: &[(&str, [u8; 3])] = &[
    ("aliceblue", [240, 248, 255]),
    ("antiquewhite", [250, 235, 215]),
    ("aqua", [0, 255, 255]),
    ("aquamarine", [127, 255, 212]),
    ("azure", [240, 255, 255]),
    ("beige", [245, 245, 220]),
    ("bisque", [255, 228, 196]),
    ("black", [0, 0, 0]),
    ("blanchedalmond", [255, 235, 205]),
    ("blue", [0, 0, 255]),
    ("blueviolet", [138, 43, 226]),
    ("brown", [165, 42, 42]),
    ("burlywood", [222, 184, 135]),
    ("cadetblue", [95, 158, 160]),
    ("chartreuse", [127, 255, 0]),
    ("chocolate", [210, 105, 30]),
    ("coral", [255, 127, 80]),
    ("cornflowerblue", [100, 149, 237]),
    ("cornsilk", [255, 248, 220]),
    ("crimson", [220, 20, 60]),
    ("cyan", [0, 255, 255]),
    ("darkblue", [0, 0, 139]),
    ("darkcyan", [0, 139, 139]),
    ("darkgoldenrod", [184, 134, 11]),
    ("darkgray", [169, 169, 169]),
    ("darkgreen", [0, 100, 0]),
    ("darkgrey", [169, 169, 169]),
    ("darkkhaki", [189, 183, 107]),
    ("darkmagenta", [139, 0, 139]),
    ("darkolivegreen", [85, 107, 47]),
    ("darkorange", [255, 140, 0]),
    ("darkorchid", [153, 50, 204]),
    ("darkred", [139, 0, 0]),
    ("darksalmon", [233, 150, 122]),
    ("darkseagreen", [143, 188, 143]),
    ("darkslateblue", [72, 61, 139]),
    ("darkslategray", [47, 79, 79]),
    ("darkslategrey", [47, 79, 79]),
    ("darkturquoise", [0, 206, 209]),
    ("darkviolet", [148, 0, 211]),
    ("deeppink", [255, 20, 147]),
    ("deepskyblue", [0, 191, 255]),
    ("dimgray", [105, 105, 105]),
    ("dimgrey", [105, 105, 105]),
    ("dodgerblue", [30, 144, 255]),
    ("firebrick", [178, 34, 34]),
    ("floralwhite", [255, 250, 240]),
    ("forestgreen", [34, 139, 34]),
    ("fuchsia", [255, 0, 255]),
    ("gainsboro", [220, 220, 220]),
    ("ghostwhite", [248, 248, 255]),
    ("gold", [255, 215, 0]),
    ("goldenrod", [218, 165, 32]),
    ("gray", [128, 128, 128]),
    ("green", [0, 128, 0]),
    ("greenyellow", [173, 255, 47]),
    ("grey", [128, 128, 128]),
    ("honeydew", [240, 255, 240]),
    ("hotpink", [255, 105, 180]),
    ("indianred", [205, 92, 92]),
    ("indigo", [75, 0, 130]),
    ("ivory", [255, 255, 240]),
    ("khaki", [240, 230, 140]),
    ("lavender", [230, 230, 250]),
    ("lavenderblush", [255, 240, 245]),
    ("lawngreen", [124, 252, 0]),
    ("lemonchiffon", [255, 250, 205]),
    ("lightblue", [173, 216, 230]),
    ("lightcoral", [240, 128, 128]),
    ("lightcyan", [224, 255, 255]),
    ("lightgoldenrodyellow", [250, 250, 210]),
    ("lightgray", [211, 211, 211]),
    ("lightgreen", [144, 238, 144]),
    ("lightgrey", [211, 211, 211]),
    ("lightpink", [255, 182, 193]),
    ("lightsalmon", [255, 160, 122]),
    ("lightseagreen", [32, 178, 170]),
    ("lightskyblue", [135, 206, 250]),
    ("lightslategray", [119, 136, 153]),
    ("lightslategrey", [119, 136, 153]),
    ("lightsteelblue", [176, 196, 222]),
    ("lightyellow", [255, 255, 224]),
    ("lime", [0, 255, 0]),
    ("limegreen", [50, 205, 50]),
    ("linen", [250, 240, 230]),
    ("magenta", [255, 0, 255]),
    ("maroon", [128, 0, 0]),
    ("mediumaquamarine", [102, 205, 170]),
    ("mediumblue", [0, 0, 205]),
    ("mediumorchid", [186, 85, 211]),
    ("mediumpurple", [147, 112, 219]),
    ("mediumseagreen", [60, 179, 113]),
    ("mediumslateblue", [123, 104, 238]),
    ("mediumspringgreen", [0, 250, 154]),
    ("mediumturquoise", [72, 209, 204]),
    ("mediumvioletred", [199, 21, 133]),
    ("midnightblue", [25, 25, 112]),
    ("mintcream", [245, 255, 250]),
    ("mistyrose", [255, 228, 225]),
    ("moccasin", [255, 228, 181]),
    ("navajowhite", [255, 222, 173]),
    ("navy", [0, 0, 128]),
    ("oldlace", [253, 245, 230]),
    ("olive", [128, 128, 0]),
    ("olivedrab", [107, 142, 35]),
    ("orange", [255, 165, 0]),
    ("orangered", [255, 69, 0]),
    ("orchid", [218, 112, 214]),
    ("palegoldenrod", [238, 232, 170]),
    ("palegreen", [152, 251, 152]),
    ("paleturquoise", [175, 238, 238]),
    ("palevioletred", [219, 112, 147]),
    ("papayawhip", [255, 239, 213]),
    ("peachpuff", [255, 218, 185]),
    ("peru", [205, 133, 63]),
    ("pink", [255, 192, 203]),
    ("plum", [221, 160, 221]),
    ("powderblue", [176, 224, 230]),
    ("purple", [128, 0, 128]),
    ("rebeccapurple", [102, 51, 153]),
    ("red", [255, 0, 0]),
    ("rosybrown", [188, 143, 143]),
    ("royalblue", [65, 105, 225]),
    ("saddlebrown", [139, 69, 19]),
    ("salmon", [250, 128, 114]),
    ("sandybrown", [244, 164, 96]),
    ("seagreen", [46, 139, 87]),
    ("seashell", [255, 245, 238]),
    ("sienna", [160, 82, 45]),
    ("silver", [192, 192, 192]),
    ("skyblue", [135, 206, 235]),
    ("slateblue", [106, 90, 205]),
    ("slategray", [112, 128, 144]),
    ("slategrey", [112, 128, 144]),
    ("snow", [255, 250, 250]),
    ("springgreen", [0, 255, 127]),
    ("steelblue", [70, 130, 180]),
    ("tan", [210, 180, 140]),
    ("teal", [0, 128, 128]),
    ("thistle", [216, 191, 216]),
    ("tomato", [255, 99, 71]),
    ("turquoise", [64, 224, 208]),
    ("violet", [238, 130, 238]),
    ("wheat", [245, 222, 179]),
    ("white", [255, 255, 255]),
    ("whitesmoke", [245, 245, 245]),
    ("yellow", [255, 255, 0]),
    ("yellowgreen", [154, 205, 50]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_table_is_sorted() {
        let mut sorted = NAMED_COLORS.to_vec();
        sorted.sort_by_key(|(name, _)| *name);
        assert_eq!(sorted, NAMED_COLORS);
    }

    #[test]
    fn black_falls_back_to_neutral_white() {
        let out = translate("black").unwrap();
        assert_eq!((out.x, out.y), NEUTRAL_WHITE);
        assert_eq!(out.brightness, 1);
    }

    #[test]
    fn garbage_is_invalid_not_a_panic() {
        assert!(translate("not-a-color").is_none());
        assert!(translate("").is_none());
        assert!(translate("#12345").is_none());
        assert!(translate("rgb(1,2)").is_none());
        assert!(translate("hsl(abc, 50%, 50%)").is_none());
    }

    #[test]
    fn saturated_red_is_full_brightness() {
        let out = translate("rgba(255,0,0,1)").unwrap();
        assert_eq!(out.brightness, 254);
        assert!(out.x > out.y, "red chromaticity has x > y, got {:?}", out);
    }

    #[test]
    fn alpha_scales_brightness() {
        let full = translate("rgb(255,255,255)").unwrap();
        let half = translate("rgba(255,255,255,0.5)").unwrap();
        assert_eq!(full.brightness, 254);
        assert_eq!(half.brightness, 127);
    }

    #[test]
    fn hex_forms() {
        assert_eq!(
            parse_css("#ff0000"),
            Some(Rgba { r: 255, g: 0, b: 0, alpha: 1.0 })
        );
        assert_eq!(
            parse_css("#F00"),
            Some(Rgba { r: 255, g: 0, b: 0, alpha: 1.0 })
        );
        let with_alpha = parse_css("#ff000080").unwrap();
        assert!((with_alpha.alpha - 128.0 / 255.0).abs() < 1e-9);
    }

    #[test]
    fn functional_forms() {
        assert_eq!(
            parse_css("rgb(100%, 0%, 0%)"),
            Some(Rgba { r: 255, g: 0, b: 0, alpha: 1.0 })
        );
        // hsl red
        assert_eq!(
            parse_css("hsl(0, 100%, 50%)"),
            Some(Rgba { r: 255, g: 0, b: 0, alpha: 1.0 })
        );
        // hsl green, case and spacing tolerant
        assert_eq!(
            parse_css("  HSL( 120deg , 100% , 50% ) "),
            Some(Rgba { r: 0, g: 255, b: 0, alpha: 1.0 })
        );
    }

    #[test]
    fn out_of_range_components_clamp() {
        assert_eq!(
            parse_css("rgb(300, -20, 128)"),
            Some(Rgba { r: 255, g: 0, b: 128, alpha: 1.0 })
        );
        let a = parse_css("rgba(0,0,0,4.5)").unwrap();
        assert_eq!(a.alpha, 1.0);
    }

    #[test]
    fn chromaticity_stays_in_unit_range() {
        for name in ["white", "teal", "gold", "navy", "hotpink"] {
            let out = translate(name).unwrap();
            assert!(out.x > 0.0 && out.x < 1.0);
            assert!(out.y > 0.0 && out.y < 1.0);
            assert!(out.brightness >= 1);
        }
    }
}
