//! Color spaces: a single `[r,g,b,a]` value or a two-stop gradient `[[r,g,b,a],[r,g,b,a]]`.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    error::KeyError,
    filters::{space::SpaceNumber, FilterType, FormValue},
};

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#([0-9a-fA-F]{6})([0-9a-fA-F]{2})?$").expect("static regex compiles")
});

static RGBA_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:rgba?\()?\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*(\d*\.?\d+)\s*)?\)?$",
    )
    .expect("static regex compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "(u8, u8, u8, SpaceNumber)",
    into = "(u8, u8, u8, SpaceNumber)"
)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    a: SpaceNumber,
}

impl Rgba {
    pub fn new(r: u8, g: u8, b: u8, alpha: f64) -> Result<Rgba, KeyError> {
        let a = SpaceNumber::new(alpha)?;
        if !(0.0..=1.0).contains(&a.value()) {
            return Err(KeyError::invalid_space(
                FilterType::Color,
                format!("[{r},{g},{b},{a}]"),
                "alpha must lie between 0 and 1",
            ));
        }
        Ok(Rgba { r, g, b, a })
    }

    pub fn opaque(r: u8, g: u8, b: u8) -> Rgba {
        Rgba {
            r,
            g,
            b,
            a: SpaceNumber::ONE,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.a.value()
    }

    /// `#RRGGBB` gives alpha 1, `#RRGGBBAA` gives alpha `AA/255` rounded to two decimals.
    pub fn from_hex(input: &str) -> Result<Rgba, KeyError> {
        let captures = HEX_COLOR.captures(input.trim()).ok_or_else(|| {
            KeyError::invalid_space(FilterType::Color, input, "not a #RRGGBB or #RRGGBBAA color")
        })?;
        let rgb = hex::decode(&captures[1])?;
        let alpha = match captures.get(2) {
            Some(aa) => {
                let aa = hex::decode(aa.as_str())?;
                (f64::from(aa[0]) / 255.0 * 100.0).round() / 100.0
            }
            None => 1.0,
        };
        Rgba::new(rgb[0], rgb[1], rgb[2], alpha)
    }

    /// Accepts `r,g,b`, `r,g,b,a` and the `rgba(r,g,b,a)` display form.
    pub fn from_components(input: &str) -> Result<Rgba, KeyError> {
        let invalid = |reason: &str| KeyError::invalid_space(FilterType::Color, input, reason);
        let captures = RGBA_COLOR
            .captures(input.trim())
            .ok_or_else(|| invalid("not an r,g,b,a color"))?;
        let channel = |i: usize| {
            captures[i]
                .parse::<u8>()
                .map_err(|_| invalid("color channels must lie between 0 and 255"))
        };
        let alpha = match captures.get(4) {
            Some(a) => a
                .as_str()
                .parse::<f64>()
                .map_err(|_| invalid("alpha is not a number"))?,
            None => 1.0,
        };
        Rgba::new(channel(1)?, channel(2)?, channel(3)?, alpha)
    }

    pub fn parse(input: &str) -> Result<Rgba, KeyError> {
        if input.trim_start().starts_with('#') {
            Rgba::from_hex(input)
        } else {
            Rgba::from_components(input)
        }
    }

    /// Inverse of [Rgba::from_hex], used to prefill color pickers. Opaque colors drop the alpha
    /// byte.
    pub fn to_hex(&self) -> String {
        let rgb = hex::encode([self.r, self.g, self.b]);
        if self.alpha() >= 1.0 {
            format!("#{rgb}")
        } else {
            let aa = (self.alpha() * 255.0).round() as u8;
            format!("#{rgb}{}", hex::encode([aa]))
        }
    }
}

impl TryFrom<(u8, u8, u8, SpaceNumber)> for Rgba {
    type Error = KeyError;

    fn try_from(value: (u8, u8, u8, SpaceNumber)) -> Result<Self, Self::Error> {
        Rgba::new(value.0, value.1, value.2, value.3.value())
    }
}

impl From<Rgba> for (u8, u8, u8, SpaceNumber) {
    fn from(color: Rgba) -> Self {
        (color.r, color.g, color.b, color.a)
    }
}

impl Display for Rgba {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgba({},{},{},{})", self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorValue {
    Single(Rgba),
    Gradient(Rgba, Rgba),
}

impl ColorValue {
    pub fn from_form_value(raw: &FormValue) -> Result<ColorValue, KeyError> {
        match raw {
            FormValue::Single(value) => Ok(ColorValue::Single(Rgba::parse(value)?)),
            FormValue::Multiple(values) => match values.as_slice() {
                [single] => Ok(ColorValue::Single(Rgba::parse(single)?)),
                [start, end] => Ok(ColorValue::Gradient(Rgba::parse(start)?, Rgba::parse(end)?)),
                _ => Err(KeyError::invalid_space(
                    FilterType::Color,
                    values.join(" "),
                    "expected one color or a two color gradient",
                )),
            },
        }
    }

    pub fn is_gradient(&self) -> bool {
        matches!(self, ColorValue::Gradient(..))
    }
}

impl Display for ColorValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorValue::Single(color) => write!(f, "{color}"),
            ColorValue::Gradient(start, end) => {
                write!(f, "linear-gradient(to right, {start},{end})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_log::test;

    #[test]
    fn hex_colors() {
        let color = Rgba::from_hex("#6f6fff").unwrap();
        assert_eq!(color, Rgba::opaque(111, 111, 255));
        assert_eq!(serde_json::to_value(color).unwrap(), json!([111, 111, 255, 1]));

        let translucent = Rgba::from_hex("#6f6fff80").unwrap();
        assert_eq!(translucent.alpha(), 0.5);
        assert_eq!(translucent.to_hex(), "#6f6fff80");
        assert_eq!(color.to_hex(), "#6f6fff");
        assert!(Rgba::from_hex("#6f6ff").is_err());
        assert!(Rgba::from_hex("6f6fff").is_err());
    }

    #[test]
    fn component_colors() {
        assert_eq!(
            Rgba::parse("255,123,10,0.1").unwrap(),
            Rgba::new(255, 123, 10, 0.1).unwrap()
        );
        assert_eq!(
            Rgba::parse("rgba(255,123,10,0.1)").unwrap(),
            Rgba::new(255, 123, 10, 0.1).unwrap()
        );
        assert_eq!(Rgba::parse("1, 2, 3").unwrap(), Rgba::opaque(1, 2, 3));
        assert!(Rgba::parse("256,0,0,1").is_err());
        assert!(Rgba::parse("0,0,0,1.5").is_err());
    }

    #[test]
    fn display_forms() {
        let single = ColorValue::Single(Rgba::new(255, 123, 10, 0.1).unwrap());
        assert_eq!(single.to_string(), "rgba(255,123,10,0.1)");

        let gradient: ColorValue =
            serde_json::from_value(json!([[255, 0, 0, 1], [0, 0, 255, 1]])).unwrap();
        assert!(gradient.is_gradient());
        assert_eq!(
            gradient.to_string(),
            "linear-gradient(to right, rgba(255,0,0,1),rgba(0,0,255,1))"
        );
    }

    #[test]
    fn json_shapes() {
        assert!(serde_json::from_value::<ColorValue>(json!([1, 2, 3, 1])).is_ok());
        assert!(serde_json::from_value::<ColorValue>(json!([1, 2, 3])).is_err());
        assert!(serde_json::from_value::<ColorValue>(json!([300, 2, 3, 1])).is_err());
        assert!(serde_json::from_value::<ColorValue>(json!([[1, 2, 3, 1]])).is_err());
        assert!(serde_json::from_value::<ColorValue>(json!("#ffffff")).is_err());
    }
}
