//! Time-window inference from natural-language temporal expressions.
//!
//! Pure text analysis over the raw user utterance. The result is only ever
//! used to backfill a `minutes` tool argument the model left missing, zeroed,
//! or blank; an explicit non-zero value from the model always wins.

use once_cell::sync::Lazy;
use regex::Regex;

/// Inferred minutes are clamped to this range.
const MIN_MINUTES: i64 = 1;
const MAX_MINUTES: i64 = 1440;

/// "{lookback-word} {quantity} {unit}" — quantity is digits or a number word,
/// unit is a minute/hour/day spelling (inflected suffixes allowed).
static WINDOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:son|geçen|geçtiğimiz)\s+(\d+|[a-zçğıöşü]+)\s*(dakika|dk|saat|sa\b|gün)[a-zçğıöşü]*",
    )
    .expect("window pattern is valid")
});

/// Closed vocabulary of Turkish number words.
fn number_word(word: &str) -> Option<i64> {
    let n = match word {
        "bir" => 1,
        "iki" => 2,
        "üç" => 3,
        "dört" => 4,
        "beş" => 5,
        "altı" => 6,
        "yedi" => 7,
        "sekiz" => 8,
        "dokuz" => 9,
        "on" => 10,
        "onbeş" => 15,
        "yirmi" => 20,
        "otuz" => 30,
        "kırk" => 40,
        "elli" => 50,
        "altmış" => 60,
        _ => return None,
    };
    Some(n)
}

/// Extract an implied lookback window (in minutes) from the user's text.
///
/// Recognizes, in order: the "half an hour" idiom (30), an explicit
/// "{son|geçen|geçtiğimiz} N {dakika|saat|gün}" window, "bugün" (1440),
/// and "şu an"/"şimdi" (5). Returns None when nothing matches.
pub fn infer_minutes(text: &str) -> Option<i64> {
    let lower = text.to_lowercase();

    if lower.contains("yarım saat") {
        return Some(30);
    }

    if let Some(caps) = WINDOW_RE.captures(&lower) {
        let quantity = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        let quantity = quantity
            .parse::<i64>()
            .ok()
            .or_else(|| number_word(quantity));

        if let Some(quantity) = quantity {
            let factor = match unit {
                "dakika" | "dk" => 1,
                "saat" | "sa" => 60,
                "gün" => 1440,
                _ => return None,
            };
            return Some((quantity * factor).clamp(MIN_MINUTES, MAX_MINUTES));
        }
    }

    if lower.contains("bugün") {
        return Some(1440);
    }

    if lower.contains("şu an") || lower.contains("şuan") || lower.contains("şimdi") {
        return Some(5);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_hours() {
        assert_eq!(infer_minutes("son 2 saat içinde CPU nasıldı?"), Some(120));
    }

    #[test]
    fn infers_minutes() {
        assert_eq!(infer_minutes("son 45 dakika ortalama RAM?"), Some(45));
    }

    #[test]
    fn infers_half_hour_idiom() {
        assert_eq!(infer_minutes("yarım saat önce GPU sıcaklığı kaçtı?"), Some(30));
    }

    #[test]
    fn infers_today() {
        assert_eq!(infer_minutes("bugün maksimum CPU kullanımı?"), Some(1440));
    }

    #[test]
    fn infers_right_now() {
        assert_eq!(infer_minutes("şu an sistem durumu nedir?"), Some(5));
    }

    #[test]
    fn no_temporal_expression_yields_none() {
        assert_eq!(infer_minutes("merhaba"), None);
    }

    #[test]
    fn number_words_are_recognized() {
        assert_eq!(infer_minutes("son iki saat neler oldu?"), Some(120));
        assert_eq!(infer_minutes("geçen on dakika CPU?"), Some(10));
    }

    #[test]
    fn inflected_units_match() {
        assert_eq!(infer_minutes("son 30 dakikada maksimum CPU kullanımı?"), Some(30));
        assert_eq!(infer_minutes("son 3 saatte RAM kullanımı?"), Some(180));
    }

    #[test]
    fn windows_clamp_to_one_day() {
        assert_eq!(infer_minutes("son 7 gün CPU?"), Some(1440));
        assert_eq!(infer_minutes("son 0 dakika?"), Some(1));
    }

    #[test]
    fn unknown_number_word_falls_through() {
        assert_eq!(infer_minutes("son milyon saat"), None);
    }
}
