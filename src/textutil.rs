use once_cell::sync::Lazy;
use regex::Regex;

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws regex"));
static DOC_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"MF\d+").expect("doc code regex"));
static SLASH_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}/\d{1,2}/\d{4}").expect("slash date regex"));
static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("iso date regex"));
static TITLE_JUNK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s&\-()]").expect("title junk regex"));
static EXTENSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").expect("ext regex"));

/// Tokens that open the metadata tail of a header line ("Revision 3", "DCR# 1021", ...).
/// A token matches when it contains the keyword.
const METADATA_KEYWORDS: [&str; 8] = [
    "Document", "Revision", "DCR#", "DCR", "Rev.", "Version", "Ver.", "Date:",
];
/// Multi-word keywords, matched against consecutive tokens.
const METADATA_PHRASES: [&[&str]; 1] = [&["Effective", "Date"]];

pub const MIN_TITLE_CHARS: usize = 4;
pub const MAX_TITLE_CHARS: usize = 150;
pub const UNTITLED: &str = "Untitled Document";

pub fn normalize_ws(text: &str) -> String {
    WS_RE.replace_all(text.trim(), " ").into_owned()
}

/// Cut `text` to `keep` characters plus "..." when it is longer than `max` characters.
pub fn truncate_chars(text: &str, max: usize, keep: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn is_metadata_token(tokens: &[&str], i: usize) -> bool {
    let tok = tokens[i];
    if METADATA_KEYWORDS.iter().any(|k| tok.contains(k)) {
        return true;
    }
    if DOC_CODE_RE.is_match(tok) || SLASH_DATE_RE.is_match(tok) || ISO_DATE_RE.is_match(tok) {
        return true;
    }
    METADATA_PHRASES.iter().any(|phrase| {
        phrase
            .iter()
            .enumerate()
            .all(|(k, word)| tokens.get(i + k).is_some_and(|t| t.contains(word)))
    })
}

/// Title portion of a header line: everything before the first metadata token, with
/// punctuation other than `&`, `-` and parentheses removed.
///
/// `None` when fewer than four characters remain.
pub fn clean_header_title(raw: &str) -> Option<String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let end = (0..tokens.len())
        .find(|&i| is_metadata_token(&tokens, i))
        .unwrap_or(tokens.len());
    let joined = tokens[..end].join(" ");
    let cleaned = normalize_ws(&TITLE_JUNK_RE.replace_all(&joined, " "));
    if cleaned.chars().count() < MIN_TITLE_CHARS {
        return None;
    }
    Some(truncate_chars(&cleaned, MAX_TITLE_CHARS, MAX_TITLE_CHARS - 3))
}

/// First `n` words of `text`; more than 80 characters are cut to 77 plus "...".
pub fn first_words(text: &str, n: usize) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().take(n).collect();
    if words.is_empty() {
        return None;
    }
    Some(truncate_chars(&words.join(" "), 80, 77))
}

/// `Quality_Manual_v2.docx` -> `Quality Manual v2`.
pub fn title_from_filename(name: Option<&str>) -> String {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return UNTITLED.to_string();
    };
    let file = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name);
    let title = EXTENSION_RE.replace(file, "").replace('_', " ");
    if title.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}
