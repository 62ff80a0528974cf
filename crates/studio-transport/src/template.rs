//! Filename template expansion.
//!
//! Supports the date tokens `%CCYY %YY %MM %DD %hh %mm %ss`, the strftime
//! singletons `%a %A %b %B %d %H %I %m %M %p %S %y %Y`, video tokens
//! `%FPS %CRES %ORES %VF` and `%%`. Unknown tokens are kept verbatim.

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use studio_video::VideoInfo;

/// Default template for recordings and replay buffers.
pub const DEFAULT_FILENAME_FORMAT: &str = "%CCYY-%MM-%DD %hh-%mm-%ss";

/// Multi-character tokens, longest first so `%CCYY` wins over `%C`.
const LONG_TOKENS: [&str; 11] = [
    "CCYY", "CRES", "ORES", "FPS", "YY", "MM", "DD", "hh", "mm", "ss", "VF",
];

/// Expand `template` for `now`, using `video` for the video tokens.
///
/// Characters that are invalid in filenames are replaced with `_`.
pub fn expand_filename_template<Tz: TimeZone>(
    template: &str,
    now: &DateTime<Tz>,
    video: Option<&VideoInfo>,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(token) = LONG_TOKENS.iter().find(|t| after.starts_with(**t)) {
            out.push_str(&long_token(token, now, video));
            rest = &after[token.len()..];
            continue;
        }

        let mut chars = after.chars();
        match chars.next() {
            Some('%') => out.push('%'),
            Some(c) if is_strftime_singleton(c) => {
                out.push_str(&now.format(&format!("%{c}")).to_string());
            }
            Some(c) => {
                out.push('%');
                out.push(c);
            }
            None => out.push('%'),
        }
        rest = chars.as_str();
    }
    out.push_str(rest);

    sanitize(&out)
}

fn long_token<Tz: TimeZone>(token: &str, now: &DateTime<Tz>, video: Option<&VideoInfo>) -> String {
    match token {
        "CCYY" => format!("{:04}", now.year()),
        "YY" => format!("{:02}", now.year().rem_euclid(100)),
        "MM" => format!("{:02}", now.month()),
        "DD" => format!("{:02}", now.day()),
        "hh" => format!("{:02}", now.hour()),
        "mm" => format!("{:02}", now.minute()),
        "ss" => format!("{:02}", now.second()),
        "FPS" => video
            .map(|v| {
                if v.fps_den == 1 {
                    v.fps_num.to_string()
                } else {
                    format!("{:.2}", v.fps())
                }
            })
            .unwrap_or_default(),
        "CRES" => video
            .map(|v| format!("{}x{}", v.base_width, v.base_height))
            .unwrap_or_default(),
        "ORES" => video
            .map(|v| format!("{}x{}", v.output_width, v.output_height))
            .unwrap_or_default(),
        "VF" => video
            .map(|v| v.output_format.name().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn is_strftime_singleton(c: char) -> bool {
    matches!(
        c,
        'a' | 'A' | 'b' | 'B' | 'd' | 'H' | 'I' | 'm' | 'M' | 'p' | 'S' | 'y' | 'Y'
    )
}

/// Name used when a template expands to nothing usable.
const FALLBACK_NAME: &str = "output";

/// Longest name part kept, in characters.
const MAX_NAME_CHARS: usize = 200;

/// Make `part` safe as a piece of a single path component.
///
/// Path separators and other characters invalid in filenames become `_`,
/// leading and trailing dots and spaces are dropped and the result is capped
/// at [`MAX_NAME_CHARS`]. May return an empty string.
pub(crate) fn sanitize_part(part: &str) -> String {
    let replaced: String = part
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    replaced
        .trim_matches(|c| c == '.' || c == ' ')
        .chars()
        .take(MAX_NAME_CHARS)
        .collect()
}

fn sanitize(name: &str) -> String {
    let clean = sanitize_part(name);
    if clean.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap()
    }

    #[test]
    fn default_format() {
        assert_eq!(
            expand_filename_template(DEFAULT_FILENAME_FORMAT, &at(), None),
            "2024-03-07 09-05-02"
        );
    }

    #[test]
    fn strftime_singletons_and_escape() {
        assert_eq!(
            expand_filename_template("%Y%m%d_%H%M%S 100%%", &at(), None),
            "20240307_090502 100%"
        );
        assert_eq!(expand_filename_template("%YY-%b", &at(), None), "24-Mar");
    }

    #[test]
    fn video_tokens() {
        let info = VideoInfo::default();
        assert_eq!(
            expand_filename_template("%CRES %ORES %FPS %VF", &at(), Some(&info)),
            "1920x1080 1280x720 30 NV12"
        );
    }

    #[test]
    fn unknown_tokens_kept_and_invalid_chars_replaced() {
        assert_eq!(
            expand_filename_template("a%Qb/c:d%", &at(), None),
            "a%Qb_c_d%"
        );
    }

    #[test]
    fn names_are_trimmed_capped_and_never_empty() {
        assert_eq!(sanitize_part("../up/and over. "), "_up_and over");
        assert_eq!(sanitize_part(" .. "), "");
        assert_eq!(expand_filename_template("..", &at(), None), FALLBACK_NAME);

        let long = "x".repeat(500);
        assert_eq!(
            expand_filename_template(&long, &at(), None).chars().count(),
            MAX_NAME_CHARS
        );
    }
}
