//! Charset detection for input files.
//!
//! BOM first, then a weighted score over the decoded sample: CJK, kana,
//! Cyrillic, and extended-Latin ranges vote for the charsets that encode
//! them natively, replacement characters vote hard against. UTF-8 wins ties
//! and empty input.

use encoding_rs::{
    Encoding, BIG5, EUC_JP, GB18030, GBK, ISO_8859_15, ISO_8859_5, KOI8_R, SHIFT_JIS, UTF_8,
    WINDOWS_1251, WINDOWS_1252,
};

/// Sample size read from the head of the file.
pub const SAMPLE_BYTES: usize = 8192;

const CANDIDATES: [&Encoding; 11] = [
    UTF_8,
    GBK,
    GB18030,
    BIG5,
    WINDOWS_1252,
    ISO_8859_15,
    SHIFT_JIS,
    EUC_JP,
    WINDOWS_1251,
    KOI8_R,
    ISO_8859_5,
];

/// Detect the charset of a byte sample.
pub fn detect_charset(sample: &[u8]) -> &'static Encoding {
    if sample.is_empty() {
        return UTF_8;
    }
    if sample.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return UTF_8;
    }

    let mut best = UTF_8;
    let mut best_score = i64::MIN;
    for candidate in CANDIDATES {
        let score = score_charset(sample, candidate);
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    if best_score >= 0 {
        best
    } else {
        UTF_8
    }
}

fn score_charset(sample: &[u8], charset: &'static Encoding) -> i64 {
    let (decoded, _, _) = charset.decode(sample);

    let mut score: i64 = 0;
    let mut total: i64 = 0;
    let mut invalid: i64 = 0;
    let mut cjk: i64 = 0;
    let mut kana: i64 = 0;
    let mut cyrillic: i64 = 0;
    let mut latin_ext: i64 = 0;
    let mut control: i64 = 0;

    for c in decoded.chars() {
        total += 1;
        match c {
            '\u{FFFD}' => invalid += 1,
            '\u{3040}'..='\u{30FF}' => {
                kana += 1;
                score += 3;
            }
            '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' => {
                cjk += 1;
                score += 3;
            }
            '\u{0400}'..='\u{04FF}' => {
                cyrillic += 1;
                score += 3;
            }
            '\u{00C0}'..='\u{017F}' => {
                latin_ext += 1;
                score += 2;
            }
            'a'..='z' | 'A'..='Z' | '0'..='9' | ' ' | ',' | '.' | ';' | ':' | '-' | '_' | '('
            | ')' => score += 2,
            c if (' '..='~').contains(&c) => score += 1,
            c if (c as u32) < 32 && c != '\t' && c != '\n' && c != '\r' => control += 1,
            _ => {}
        }
    }

    if total == 0 {
        return -100;
    }
    score -= invalid * 15;
    if invalid * 10 > total {
        return -100;
    }

    let is_simplified = charset == GBK || charset == GB18030;
    let is_big5 = charset == BIG5;
    let is_japanese = charset == SHIFT_JIS || charset == EUC_JP;
    let is_cyrillic_charset =
        charset == WINDOWS_1251 || charset == KOI8_R || charset == ISO_8859_5;
    let is_latin = charset == WINDOWS_1252 || charset == ISO_8859_15;
    let is_utf8 = charset == UTF_8;

    if cjk > 0 && is_simplified {
        if kana == 0 {
            score += cjk * 2;
        } else {
            score -= cjk * 3;
        }
    }
    if cjk > 0 && is_big5 {
        if kana == 0 && cyrillic == 0 {
            score += cjk * 2;
        } else {
            score -= cjk * 3;
        }
    }
    if cjk > 0 && is_utf8 {
        score += cjk;
    }
    if kana > 0 && is_japanese {
        score += kana * 2 + cjk * 2;
    }
    if kana > 0 && is_utf8 {
        score += kana + cjk;
    }
    if cyrillic > 0 && is_cyrillic_charset {
        score += cyrillic * 2;
    }
    if cyrillic > 0 && is_utf8 {
        score += cyrillic;
    }
    if latin_ext > 0 && is_latin {
        score += latin_ext;
    }
    if latin_ext > 0 && is_utf8 {
        score += latin_ext / 2;
    }
    if cyrillic > 0 && (is_latin || is_simplified || is_big5) {
        score -= cyrillic * 5;
    }
    if cjk > 0 && is_latin {
        score -= cjk * 5;
    }
    if kana > 0 && (is_latin || is_simplified || is_big5) {
        score -= kana * 5;
    }
    if control * 10 > total * 3 {
        score -= control * 2;
    }

    score
}
