use whatlang::Lang;

use super::content::strip_tags;
use crate::model::User;

/// Languages read by character rather than by word.
pub const CJK_LANGUAGES: [&str; 3] = ["zh", "ja", "ko"];

/// Two-letter code for the CJK family, whatlang's three-letter code
/// otherwise.
pub fn language_code(text: &str) -> Option<&'static str> {
    let lang = whatlang::detect_lang(text)?;
    Some(match lang {
        Lang::Cmn => "zh",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        other => other.code(),
    })
}

/// Estimated reading time in whole minutes, rounded up.
///
/// CJK text is measured in characters against the user's CJK speed,
/// everything else in words against the default speed. A non-positive
/// speed yields zero.
pub fn estimate(content: &str, user: &User) -> i64 {
    let text = strip_tags(content);
    let is_cjk = language_code(&text).is_some_and(|code| CJK_LANGUAGES.contains(&code));

    let (units, speed) = if is_cjk {
        (text.chars().count(), user.cjk_reading_speed)
    } else {
        (text.split_whitespace().count(), user.default_reading_speed)
    };

    match usize::try_from(speed) {
        Ok(speed) if speed > 0 => i64::try_from(units.div_ceil(speed)).unwrap_or(i64::MAX),
        _ => 0,
    }
}
