//! `$text` evaluation for the in-memory store.
//!
//! Search strings follow the usual text-index grammar: bare words are ORed,
//! `"quoted phrases"` are required, and `-word` excludes documents containing
//! the word. The relevance score is the number of word and phrase hits.

use serde_json::Value;

use crate::store::document::lookup;
use crate::store::query::{Document, TextQuery};

#[derive(Debug, Clone)]
pub(crate) struct TextMatcher {
    case_sensitive: bool,
    diacritic_sensitive: bool,
    fields: Vec<String>,
    terms: Vec<String>,
    phrases: Vec<Vec<String>>,
    negated: Vec<String>,
}

impl TextMatcher {
    /// Build a matcher searching `fields`, or every string when `fields` is empty.
    pub(crate) fn new(query: &TextQuery, fields: &[String]) -> Self {
        let mut matcher = Self {
            case_sensitive: query.case_sensitive,
            diacritic_sensitive: query.diacritic_sensitive,
            fields: fields.to_vec(),
            terms: Vec::new(),
            phrases: Vec::new(),
            negated: Vec::new(),
        };

        let mut loose = String::new();
        for (i, chunk) in query.search.split('"').enumerate() {
            // Odd chunks sit between quotes.
            if i % 2 == 1 {
                let words = matcher.words(chunk);
                if !words.is_empty() {
                    matcher.phrases.push(words);
                }
            } else {
                loose.push(' ');
                loose.push_str(chunk);
            }
        }

        for token in loose.split_whitespace() {
            match token.strip_prefix('-') {
                Some(rest) if !rest.is_empty() => {
                    let words = matcher.words(rest);
                    matcher.negated.extend(words);
                }
                _ => {
                    let words = matcher.words(token);
                    matcher.terms.extend(words);
                }
            }
        }

        matcher
    }

    /// Relevance score for `doc`, or `None` when the document does not match.
    pub(crate) fn score(&self, doc: &Document) -> Option<f64> {
        if self.terms.is_empty() && self.phrases.is_empty() {
            return None;
        }

        let words = self.words(&self.document_text(doc));

        if self.negated.iter().any(|n| words.contains(n)) {
            return None;
        }

        let mut phrase_hits = 0usize;
        for phrase in &self.phrases {
            let hits = count_phrase(&words, phrase);
            if hits == 0 {
                return None;
            }
            phrase_hits += hits;
        }

        let term_hits = self
            .terms
            .iter()
            .map(|t| words.iter().filter(|w| *w == t).count())
            .sum::<usize>();

        if self.phrases.is_empty() && term_hits == 0 {
            return None;
        }

        Some((term_hits + phrase_hits) as f64)
    }

    fn document_text(&self, doc: &Document) -> String {
        let mut out = String::new();
        if self.fields.is_empty() {
            for value in doc.values() {
                collect_strings(value, &mut out);
            }
        } else {
            for field in &self.fields {
                for value in lookup(doc, field) {
                    collect_strings(value, &mut out);
                }
            }
        }
        out
    }

    /// Split text into normalized words.
    fn words(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| self.normalize(w))
            .collect()
    }

    fn normalize(&self, word: &str) -> String {
        let word = if self.diacritic_sensitive {
            word.to_string()
        } else {
            word.chars().map(fold_diacritic).collect()
        };
        if self.case_sensitive {
            word
        } else {
            word.to_lowercase()
        }
    }
}

fn collect_strings(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push(' ');
            out.push_str(s);
        }
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn count_phrase(words: &[String], phrase: &[String]) -> usize {
    if phrase.is_empty() || phrase.len() > words.len() {
        return 0;
    }
    words.windows(phrase.len()).filter(|w| *w == phrase).count()
}

/// Map an accented Latin letter to its base letter.
fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => 'A',
        'ç' | 'ć' | 'č' => 'c',
        'Ç' | 'Ć' | 'Č' => 'C',
        'ď' | 'đ' => 'd',
        'Ď' | 'Đ' => 'D',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => 'E',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' => 'I',
        'ł' => 'l',
        'Ł' => 'L',
        'ñ' | 'ń' | 'ň' => 'n',
        'Ñ' | 'Ń' | 'Ň' => 'N',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => 'O',
        'ř' => 'r',
        'Ř' => 'R',
        'ś' | 'š' | 'ş' => 's',
        'Ś' | 'Š' | 'Ş' => 'S',
        'ť' | 'ţ' => 't',
        'Ť' | 'Ţ' => 'T',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' | 'Ų' => 'U',
        'ý' | 'ÿ' => 'y',
        'Ý' | 'Ÿ' => 'Y',
        'ź' | 'ż' | 'ž' => 'z',
        'Ź' | 'Ż' | 'Ž' => 'Z',
        other => other,
    }
}
