//! Identifier case conversion.
//!
//! [`StringConv`] turns free text or identifiers into `camelCase`, `PascalCase`, `kebab-case`,
//! `snake_case`, `COBOL-CASE`, `MACRO_CASE`, `flatlower` and `FLATUPPER`.
//!
//! ```rust
//! use yali_core::strings::StringConv;
//!
//! let conv = StringConv::default();
//! assert_eq!(conv.to_snakecase("Yali, toolkit!").unwrap(), "yali_toolkit");
//! assert_eq!(conv.to_macrocase("yaliToolkit").unwrap(), "YALI_TOOLKIT");
//! ```

use crate::consts::DEFAULT_DELIMITERS;
use crate::error::CoreError;
use std::iter::Peekable;
use std::str::Chars;

/// Lowercases `value` and replaces every run of default delimiters with `_`.
#[must_use]
pub fn lower_with_underscores(value: &str) -> String {
    replace_runs(value, DEFAULT_DELIMITERS, '_').to_lowercase()
}

/// Lowercases `value` and replaces every run of default delimiters with `-`.
#[must_use]
pub fn lower_with_hyphens(value: &str) -> String {
    replace_runs(value, DEFAULT_DELIMITERS, '-').to_lowercase()
}

fn replace_runs(value: &str, chars: &str, with: char) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for ch in value.chars() {
        if chars.contains(ch) {
            if !in_run {
                out.push(with);
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out
}

/// At least one cased character and no lowercase one.
fn is_all_upper(value: &str) -> bool {
    let mut cased = false;
    for ch in value.chars() {
        if ch.is_lowercase() {
            return false;
        }
        cased |= ch.is_uppercase();
    }
    cased
}

fn is_lower_alpha(ch: Option<char>) -> bool {
    ch.is_some_and(|c| c.is_alphabetic() && c.is_lowercase())
}

fn is_upper_alpha(ch: Option<char>) -> bool {
    ch.is_some_and(|c| c.is_alphabetic() && c.is_uppercase())
}

/// A rule that may claim the current character and write its own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenMarker {
    /// On a delimiter: joiner, then the next character uppercased.
    DelimiterNextUpper,
    /// On a delimiter: joiner, then the next character lowercased.
    DelimiterNextLower,
    /// lower -> UPPER transition: joiner, then the character uppercased.
    LowerUpperAppendUpper,
    /// lower -> UPPER transition: joiner, then the character lowercased.
    LowerUpperAppendLower,
    /// UPPER -> UPPER transition: joiner, then the character.
    UpperUpperAppendJoin,
    /// UPPER -> UPPER transition: the character as is.
    UpperUpperAppendCurrent,
}

struct MarkerContext<'a> {
    delimiters: &'a str,
    join: &'a str,
}

impl TokenMarker {
    fn mark(
        self,
        ctx: &MarkerContext<'_>,
        curr: char,
        prev: Option<char>,
        input: &mut Peekable<Chars<'_>>,
        out: &mut String,
    ) -> bool {
        match self {
            Self::DelimiterNextUpper | Self::DelimiterNextLower => {
                if !ctx.delimiters.contains(curr) {
                    return false;
                }
                out.push_str(ctx.join);
                if let Some(next) = input.next() {
                    if self == Self::DelimiterNextUpper {
                        out.extend(next.to_uppercase());
                    } else {
                        out.extend(next.to_lowercase());
                    }
                }
                true
            },
            Self::LowerUpperAppendUpper | Self::LowerUpperAppendLower => {
                if !is_lower_alpha(prev) || !curr.is_uppercase() {
                    return false;
                }
                out.push_str(ctx.join);
                if self == Self::LowerUpperAppendUpper {
                    out.push(curr);
                } else {
                    out.extend(curr.to_lowercase());
                }
                true
            },
            Self::UpperUpperAppendJoin | Self::UpperUpperAppendCurrent => {
                if !is_upper_alpha(prev) || !curr.is_uppercase() {
                    return false;
                }
                if self == Self::UpperUpperAppendJoin {
                    out.push_str(ctx.join);
                }
                out.push(curr);
                true
            },
        }
    }
}

/// Case converter configured with a delimiter set.
#[derive(Debug, Clone)]
pub struct StringConv {
    delimiters: String,
    clear_punctuation: bool,
}

impl Default for StringConv {
    fn default() -> Self {
        Self { delimiters: DEFAULT_DELIMITERS.to_owned(), clear_punctuation: true }
    }
}

impl StringConv {
    /// # Errors
    /// Returns [`CoreError::Validation`] when `delimiters` is empty.
    pub fn new(delimiters: impl Into<String>, clear_punctuation: bool) -> Result<Self, CoreError> {
        let delimiters = delimiters.into();
        if delimiters.is_empty() {
            return Err(CoreError::validation("At least one delimiter is required"));
        }
        Ok(Self { delimiters, clear_punctuation })
    }

    pub fn to_camelcase(&self, value: &str) -> Result<String, CoreError> {
        let prepared = self.prepare(value)?;
        Ok(self.convert(
            &prepared,
            "",
            &[TokenMarker::DelimiterNextUpper, TokenMarker::LowerUpperAppendUpper],
            false,
            false,
        ))
    }

    pub fn to_pascalcase(&self, value: &str) -> Result<String, CoreError> {
        let prepared = self.prepare(value)?;
        Ok(self.convert(
            &prepared,
            "",
            &[
                TokenMarker::DelimiterNextUpper,
                TokenMarker::LowerUpperAppendUpper,
                TokenMarker::UpperUpperAppendCurrent,
            ],
            false,
            true,
        ))
    }

    pub fn to_kebabcase(&self, value: &str) -> Result<String, CoreError> {
        let prepared = self.prepare(value)?;
        Ok(self.convert(
            &prepared,
            "-",
            &[TokenMarker::DelimiterNextLower, TokenMarker::LowerUpperAppendLower],
            false,
            false,
        ))
    }

    pub fn to_snakecase(&self, value: &str) -> Result<String, CoreError> {
        let prepared = self.prepare(value)?;
        Ok(self.convert(
            &prepared,
            "_",
            &[TokenMarker::DelimiterNextLower, TokenMarker::LowerUpperAppendLower],
            false,
            false,
        ))
    }

    /// Already uppercase input only has its delimiter runs replaced.
    pub fn to_cobolcase(&self, value: &str) -> Result<String, CoreError> {
        if is_all_upper(value) {
            return Ok(replace_runs(value, &self.delimiters, '-'));
        }
        let prepared = self.prepare(value)?;
        Ok(self.convert(
            &prepared,
            "-",
            &[TokenMarker::DelimiterNextUpper, TokenMarker::LowerUpperAppendUpper],
            true,
            false,
        ))
    }

    /// Already uppercase input only has its delimiter runs replaced.
    pub fn to_macrocase(&self, value: &str) -> Result<String, CoreError> {
        if is_all_upper(value) {
            return Ok(replace_runs(value, &self.delimiters, '_'));
        }
        let prepared = self.prepare(value)?;
        Ok(self.convert(
            &prepared,
            "_",
            &[
                TokenMarker::DelimiterNextUpper,
                TokenMarker::LowerUpperAppendUpper,
                TokenMarker::UpperUpperAppendJoin,
            ],
            true,
            false,
        ))
    }

    pub fn to_flatlower(&self, value: &str) -> Result<String, CoreError> {
        let prepared = self.prepare(value)?;
        Ok(self.convert(
            &prepared,
            "",
            &[TokenMarker::DelimiterNextLower, TokenMarker::LowerUpperAppendLower],
            false,
            false,
        ))
    }

    pub fn to_flatupper(&self, value: &str) -> Result<String, CoreError> {
        let prepared = self.prepare(value)?;
        Ok(self.convert(
            &prepared,
            "",
            &[TokenMarker::DelimiterNextUpper, TokenMarker::LowerUpperAppendUpper],
            true,
            false,
        ))
    }

    /// Strips edge delimiters, drops foreign punctuation, collapses delimiter runs and
    /// lowercases fully uppercase input.
    fn prepare(&self, value: &str) -> Result<String, CoreError> {
        if value.is_empty() {
            return Err(CoreError::validation("Empty string passed for conversion"));
        }

        let trimmed = value.trim_matches(|c| self.delimiters.contains(c));
        let cleared: String = if self.clear_punctuation {
            trimmed
                .chars()
                .filter(|c| !c.is_ascii_punctuation() || self.delimiters.contains(*c))
                .collect()
        } else {
            trimmed.to_owned()
        };

        let primary = self.delimiters.chars().next().unwrap_or(' ');
        let collapsed = replace_runs(&cleared, &self.delimiters, primary);

        Ok(if is_all_upper(&collapsed) { collapsed.to_lowercase() } else { collapsed })
    }

    fn convert(
        &self,
        prepared: &str,
        join: &str,
        markers: &[TokenMarker],
        unmarked_upper: bool,
        capitalize_first: bool,
    ) -> String {
        let ctx = MarkerContext { delimiters: &self.delimiters, join };
        let mut input = prepared.chars().peekable();
        let mut out = String::with_capacity(prepared.len() + 8);

        if capitalize_first && let Some(first) = input.next() {
            out.extend(first.to_uppercase());
        }

        let mut prev = None;
        while let Some(curr) = input.next() {
            let marked = markers.iter().any(|m| m.mark(&ctx, curr, prev, &mut input, &mut out));
            if !marked {
                if unmarked_upper {
                    out.extend(curr.to_uppercase());
                } else {
                    out.extend(curr.to_lowercase());
                }
            }
            prev = Some(curr);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(convert: impl Fn(&StringConv, &str) -> Result<String, CoreError>, cases: &[(&str, &str)]) {
        let conv = StringConv::default();
        for (input, expected) in cases {
            assert_eq!(convert(&conv, input).unwrap(), *expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_lower_with_joiners() {
        assert_eq!(lower_with_underscores("My App -_ Name"), "my_app_name");
        assert_eq!(lower_with_hyphens("My App -_ Name"), "my-app-name");
        assert_eq!(lower_with_hyphens("service"), "service");
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(StringConv::default().to_camelcase("").is_err());
        assert!(StringConv::new("", true).is_err());
    }

    #[test]
    fn test_to_camelcase() {
        check(
            StringConv::to_camelcase,
            &[
                ("Yali, toolkit!", "yaliToolkit"),
                ("yaliToolkit", "yaliToolkit"),
                ("Yali-Toolkit", "yaliToolkit"),
                ("YALI-TOOLKIT", "yaliToolkit"),
                ("Yali toolkit", "yaliToolkit"),
                ("Yali   Toolkit", "yaliToolkit"),
                ("Yali -__  Toolkit", "yaliToolkit"),
                (" yali toolkit ", "yaliToolkit"),
                ("yalI", "yalI"),
                ("all work !nO play makes JACK @a duLl Gu'y", "allWorkNoPlayMakesJackADuLlGuy"),
                ("yali ToolKit", "yaliToolKit"),
            ],
        );
    }

    #[test]
    fn test_to_pascalcase() {
        check(
            StringConv::to_pascalcase,
            &[
                ("Yali, toolkit!", "YaliToolkit"),
                ("yaliToolkit", "YaliToolkit"),
                ("Yali-Toolkit", "YaliToolkit"),
                ("YALI-TOOLKIT", "YaliToolkit"),
                ("Yali toolkit", "YaliToolkit"),
                ("Yali   Toolkit", "YaliToolkit"),
                ("Yali -__  Toolkit", "YaliToolkit"),
                (" yali toolkit ", "YaliToolkit"),
                ("yalI", "YalI"),
                ("all work !nO play makes JacK @a duLl Gu'y", "AllWorkNoPlayMakesJacKADuLlGuy"),
                ("yali ToolKit", "YaliToolKit"),
            ],
        );
    }

    #[test]
    fn test_to_cobolcase() {
        check(
            StringConv::to_cobolcase,
            &[
                ("Yali, toolkit!", "YALI-TOOLKIT"),
                ("yaliToolkit", "YALI-TOOLKIT"),
                ("Yali-Toolkit", "YALI-TOOLKIT"),
                ("YALI-TOOLKIT", "YALI-TOOLKIT"),
                ("Yali toolkit", "YALI-TOOLKIT"),
                ("Yali   Toolkit", "YALI-TOOLKIT"),
                ("Yali -__  Toolkit", "YALI-TOOLKIT"),
                (" yali toolkit ", "YALI-TOOLKIT"),
                ("yalI", "YAL-I"),
                (
                    "all work !nO play makes JaCK @a duLl Gu'y",
                    "ALL-WORK-NO-PLAY-MAKES-JA-CK-A-DU-LL-GUY",
                ),
                ("yali ToolKit", "YALI-TOOL-KIT"),
            ],
        );
    }

    #[test]
    fn test_to_macrocase() {
        check(
            StringConv::to_macrocase,
            &[
                ("Yali, toolkit!", "YALI_TOOLKIT"),
                ("yaliToolkit", "YALI_TOOLKIT"),
                ("Yali-Toolkit", "YALI_TOOLKIT"),
                ("YALI-TOOLKIT", "YALI_TOOLKIT"),
                ("Yali toolkit", "YALI_TOOLKIT"),
                ("Yali   Toolkit", "YALI_TOOLKIT"),
                ("Yali -__  Toolkit", "YALI_TOOLKIT"),
                (" yali toolkit ", "YALI_TOOLKIT"),
                ("yalI", "YAL_I"),
                (
                    "all work !nO play makes JaCK @a duLl Gu'y",
                    "ALL_WORK_NO_PLAY_MAKES_JA_C_K_A_DU_LL_GUY",
                ),
                ("yali ToolKit", "YALI_TOOL_KIT"),
            ],
        );
    }

    #[test]
    fn test_to_kebabcase() {
        check(
            StringConv::to_kebabcase,
            &[
                ("Yali, toolkit!", "yali-toolkit"),
                ("yaliToolkit", "yali-toolkit"),
                ("YALI-TOOLKIT", "yali-toolkit"),
                ("Yali -__  Toolkit", "yali-toolkit"),
                (" yali toolkit ", "yali-toolkit"),
                ("yalI", "yal-i"),
                ("all work !nO play makes JACK @a duLl Gu'y", "all-work-no-play-makes-jack-a-du-ll-guy"),
                ("yali ToolKit", "yali-tool-kit"),
            ],
        );
    }

    #[test]
    fn test_to_snakecase() {
        check(
            StringConv::to_snakecase,
            &[
                ("Yali, toolkit!", "yali_toolkit"),
                ("yaliToolkit", "yali_toolkit"),
                ("YALI-TOOLKIT", "yali_toolkit"),
                ("Yali   Toolkit", "yali_toolkit"),
                ("yalI", "yal_i"),
                ("all work !nO play makes JACK @a duLl Gu'y", "all_work_no_play_makes_jack_a_du_ll_guy"),
                ("yali ToolKit", "yali_tool_kit"),
            ],
        );
    }

    #[test]
    fn test_to_flat_cases() {
        check(
            StringConv::to_flatlower,
            &[
                ("Yali, toolkit!", "yalitoolkit"),
                ("YALI-TOOLKIT", "yalitoolkit"),
                ("yalI", "yali"),
                ("all work !nO play makes JACK @a duLl Gu'y", "allworknoplaymakesjackadullguy"),
            ],
        );
        check(
            StringConv::to_flatupper,
            &[
                ("Yali, toolkit!", "YALITOOLKIT"),
                ("yaliToolkit", "YALITOOLKIT"),
                ("yalI", "YALI"),
                ("all work !nO play makes JACK @a duLl Gu'y", "ALLWORKNOPLAYMAKESJACKADULLGUY"),
            ],
        );
    }

    #[test]
    fn test_custom_delimiters_keep_other_punctuation() {
        let conv = StringConv::new(".", false).unwrap();
        assert_eq!(conv.to_snakecase("app.name-v2").unwrap(), "app_name-v2");
    }
}
