// ABOUTME: Rule-based message analysis: sentiment, keywords, category, language.
// ABOUTME: Keyword/pattern counters standing in for a real NLP stack.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "amazing", "awesome", "happy", "excellent", "love", "thank", "thanks",
    "appreciate", "positive", "excited", "glad", "nice", "pleasant", "wonderful", "joy",
    "impressive", "impressed",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "horrible", "awful", "sad", "unhappy", "angry", "upset", "disappointed",
    "fail", "poor", "negative", "unfortunate", "sorry", "mistake", "worst", "hate", "trouble",
    "inconvenient", "problem",
];

const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by", "for",
    "with", "about", "against", "between", "into", "through", "during", "before", "after",
    "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
    "again", "further", "then", "once", "here", "there", "when", "where", "why", "how", "all",
    "any", "both", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
    "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will", "just", "don",
    "should", "now",
];

/// Emotional tone of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Question,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentReport {
    pub sentiment: Sentiment,
    pub score: f64,
    pub positive_count: usize,
    pub negative_count: usize,
}

/// Message type, decided by pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Question,
    Greeting,
    Farewell,
    Gratitude,
    Apology,
    Request,
    Complaint,
    Feedback,
    Statement,
}

#[derive(Debug, Clone, Serialize)]
pub struct LanguageGuess {
    pub code: &'static str,
    pub name: &'static str,
    pub confidence: f64,
}

/// Combined analysis threaded through the pipeline to the generator.
#[derive(Debug, Clone, Serialize)]
pub struct MessageAnalysis {
    pub sentiment: SentimentReport,
    pub category: Category,
    pub keywords: Vec<String>,
    pub language: LanguageGuess,
}

/// Run every analyzer over one message.
pub fn analyze(message: &str) -> MessageAnalysis {
    MessageAnalysis {
        sentiment: analyze_sentiment(message),
        category: categorize(message),
        keywords: extract_keywords(message, 5),
        language: detect_language(message),
    }
}

fn tokenize(message: &str) -> Vec<String> {
    message
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Classify the emotional tone of a message by counting tone words.
/// A tie with a question mark present reads as a question.
pub fn analyze_sentiment(message: &str) -> SentimentReport {
    let tokens = tokenize(message);
    let positive_count = tokens.iter().filter(|t| POSITIVE_WORDS.contains(&t.as_str())).count();
    let negative_count = tokens.iter().filter(|t| NEGATIVE_WORDS.contains(&t.as_str())).count();

    let (sentiment, score) = if positive_count > negative_count {
        (
            Sentiment::Positive,
            (0.5 + (positive_count - negative_count) as f64 * 0.1).min(1.0),
        )
    } else if negative_count > positive_count {
        (
            Sentiment::Negative,
            (0.5 + (negative_count - positive_count) as f64 * 0.1).min(1.0),
        )
    } else if message.contains('?') {
        (Sentiment::Question, 0.7)
    } else {
        (Sentiment::Neutral, 0.5)
    };

    SentimentReport {
        sentiment,
        score: (score * 100.0).round() / 100.0,
        positive_count,
        negative_count,
    }
}

/// Extract up to `max_keywords` frequent non-stopword terms, supplemented
/// with repeated bigrams. Frequency-based; no weighting beyond counts.
pub fn extract_keywords(message: &str, max_keywords: usize) -> Vec<String> {
    let words: Vec<String> = tokenize(message)
        .into_iter()
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
        .collect();

    // Count while preserving first-seen order so ties stay stable.
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in &words {
        if !counts.contains_key(word) {
            order.push(word.clone());
        }
        *counts.entry(word.clone()).or_insert(0) += 1;
    }
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));

    let mut keywords: Vec<String> = order.into_iter().take(max_keywords).collect();

    if words.len() > 1 && keywords.len() < max_keywords {
        let mut bigram_order: Vec<String> = Vec::new();
        let mut bigram_counts: HashMap<String, usize> = HashMap::new();
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            if !bigram_counts.contains_key(&bigram) {
                bigram_order.push(bigram.clone());
            }
            *bigram_counts.entry(bigram).or_insert(0) += 1;
        }
        bigram_order.sort_by(|a, b| bigram_counts[b].cmp(&bigram_counts[a]));
        for bigram in bigram_order.into_iter().take(3) {
            if bigram_counts[&bigram] > 1 && keywords.len() < max_keywords {
                keywords.push(bigram);
            }
        }
    }

    keywords
}

fn category_patterns() -> &'static [(Category, Vec<Regex>)] {
    static PATTERNS: OnceLock<Vec<(Category, Vec<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("static pattern compiles"))
                .collect()
        };
        vec![
            (
                Category::Question,
                compile(&[
                    r"\bwho\b", r"\bwhat\b", r"\bwhen\b", r"\bwhere\b", r"\bwhy\b", r"\bhow\b",
                    r"\bcan you\b", r"\bcould you\b", r"\bwould you\b", r"\?$",
                ]),
            ),
            (
                Category::Greeting,
                compile(&[
                    r"^hi\b", r"^hello\b", r"^hey\b", r"^good morning\b", r"^good afternoon\b",
                    r"^good evening\b", r"^greetings\b", r"^howdy\b",
                ]),
            ),
            (
                Category::Farewell,
                compile(&[
                    r"\bbye\b", r"\bgoodbye\b", r"\bsee you\b", r"\btalk to you later\b",
                    r"\btake care\b", r"\bhave a good day\b", r"\bhave a nice day\b",
                ]),
            ),
            (
                Category::Gratitude,
                compile(&[r"\bthanks\b", r"\bthank you\b", r"\bappreciate\b", r"\bgrateful\b"]),
            ),
            (
                Category::Apology,
                compile(&[
                    r"\bsorry\b", r"\bapologize\b", r"\bapologies\b", r"\bexcuse me\b",
                    r"\bpardon\b", r"\bmy bad\b", r"\bmistake\b",
                ]),
            ),
            (
                Category::Request,
                compile(&[
                    r"\bcan you\b", r"\bcould you\b", r"\bwould you\b", r"\bplease\b",
                    r"\bhelp me\b", r"\bi need\b", r"\bi want\b", r"\bassist\b",
                ]),
            ),
            (
                Category::Complaint,
                compile(&[
                    r"\bnot working\b", r"\bproblem\b", r"\bissue\b", r"\bcomplain\b",
                    r"\bfail\b", r"\bbroken\b", r"\bdoesn't work\b", r"\bunable\b",
                    r"\bdissatisfied\b", r"\bunhappy\b",
                ]),
            ),
            (
                Category::Feedback,
                compile(&[
                    r"\bsuggestion\b", r"\bfeedback\b", r"\bimprove\b", r"\bimprovement\b",
                    r"\benhance\b", r"\bbetter if\b", r"\bcould be better\b",
                ]),
            ),
        ]
    })
}

/// Categorize a message by counting pattern hits; the highest-scoring
/// category wins, falling back to Statement when nothing matches. Earlier
/// categories win ties, so a "can you help" reads as a question before a
/// request.
pub fn categorize(message: &str) -> Category {
    let text = message.to_lowercase();
    let mut best = Category::Statement;
    let mut best_score = 0usize;

    for (category, patterns) in category_patterns() {
        let score: usize = patterns.iter().map(|p| p.find_iter(&text).count()).sum();
        if score > best_score {
            best = *category;
            best_score = score;
        }
    }

    best
}

const LANGUAGE_WORDS: &[(&str, &str, &[&str])] = &[
    (
        "en",
        "English",
        &[
            "the", "and", "is", "in", "to", "it", "you", "that", "was", "for", "on", "are",
            "with", "as", "they",
        ],
    ),
    (
        "es",
        "Spanish",
        &[
            "el", "la", "de", "en", "y", "a", "que", "los", "se", "un", "por", "con", "para",
            "es", "su",
        ],
    ),
    (
        "fr",
        "French",
        &[
            "le", "la", "de", "et", "à", "en", "un", "une", "du", "que", "qui", "dans", "les",
            "est", "pour",
        ],
    ),
    (
        "de",
        "German",
        &[
            "der", "die", "und", "in", "den", "von", "zu", "das", "mit", "sich", "des", "auf",
            "für", "ist", "im",
        ],
    ),
    (
        "it",
        "Italian",
        &[
            "il", "di", "che", "la", "in", "e", "per", "un", "una", "sono", "mi", "ho", "si",
            "lo", "non",
        ],
    ),
];

/// Guess the message language by scoring common-word hits, normalized by
/// message length. Low-confidence guesses come back as unknown.
pub fn detect_language(message: &str) -> LanguageGuess {
    let tokens = tokenize(message);
    if tokens.is_empty() {
        return LanguageGuess {
            code: "unknown",
            name: "Unknown",
            confidence: 0.0,
        };
    }

    let mut best: Option<LanguageGuess> = None;
    for &(code, name, words) in LANGUAGE_WORDS {
        let hits = tokens.iter().filter(|t| words.contains(&t.as_str())).count();
        let confidence = hits as f64 / tokens.len().max(1) as f64;
        if best.as_ref().map(|b| confidence > b.confidence).unwrap_or(true) {
            best = Some(LanguageGuess {
                code,
                name,
                confidence,
            });
        }
    }

    let mut guess = best.unwrap_or(LanguageGuess {
        code: "unknown",
        name: "Unknown",
        confidence: 0.0,
    });
    if guess.confidence < 0.1 {
        guess = LanguageGuess {
            code: "unknown",
            name: "Unknown",
            confidence: guess.confidence,
        };
    }
    guess
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_positive() {
        let report = analyze_sentiment("I'm really happy with the service, it was excellent!");
        assert_eq!(report.sentiment, Sentiment::Positive);
        assert!(report.score > 0.5);
        assert_eq!(report.negative_count, 0);
    }

    #[test]
    fn test_sentiment_negative() {
        let report = analyze_sentiment("This is terrible, I'm very disappointed with the quality.");
        assert_eq!(report.sentiment, Sentiment::Negative);
        assert_eq!(report.positive_count, 0);
        assert!(report.negative_count >= 2);
    }

    #[test]
    fn test_sentiment_question_on_tie() {
        let report = analyze_sentiment("Can you tell me more about your products?");
        assert_eq!(report.sentiment, Sentiment::Question);
    }

    #[test]
    fn test_sentiment_neutral() {
        let report = analyze_sentiment("The weather is cloudy today.");
        assert_eq!(report.sentiment, Sentiment::Neutral);
        assert_eq!(report.score, 0.5);
    }

    #[test]
    fn test_keywords_filter_stopwords() {
        let keywords = extract_keywords(
            "I need help with my account settings, I can't find where to change my password.",
            5,
        );
        assert!(keywords.contains(&"account".to_string()));
        assert!(keywords.contains(&"password".to_string()));
        assert!(!keywords.iter().any(|k| k == "the" || k == "my"));
    }

    #[test]
    fn test_keywords_respect_limit() {
        let keywords = extract_keywords(
            "smartphone camera battery display processor speaker antenna housing",
            3,
        );
        assert_eq!(keywords.len(), 3);
    }

    #[test]
    fn test_keywords_repeated_word_ranks_first() {
        let keywords = extract_keywords("printer broken printer paper printer", 5);
        assert_eq!(keywords[0], "printer");
    }

    #[test]
    fn test_categorize_greeting() {
        assert_eq!(categorize("Hello there!"), Category::Greeting);
    }

    #[test]
    fn test_categorize_question_outscores_greeting() {
        // "how" plus the trailing question mark beat the greeting prefix.
        assert_eq!(
            categorize("Hello, how are you doing today?"),
            Category::Question
        );
    }

    #[test]
    fn test_categorize_question() {
        assert_eq!(categorize("What are your business hours?"), Category::Question);
    }

    #[test]
    fn test_categorize_gratitude() {
        assert_eq!(
            categorize("Thank you for your assistance with my order."),
            Category::Gratitude
        );
    }

    #[test]
    fn test_categorize_complaint() {
        assert_eq!(
            categorize("The website is not working properly, I keep getting an issue."),
            Category::Complaint
        );
    }

    #[test]
    fn test_categorize_statement_fallback() {
        assert_eq!(categorize("The sky is blue."), Category::Statement);
    }

    #[test]
    fn test_detect_language_english() {
        let guess = detect_language("Hello, how are you doing today? I would like the details.");
        assert_eq!(guess.code, "en");
    }

    #[test]
    fn test_detect_language_spanish() {
        let guess =
            detect_language("Hola, me gustaría obtener información sobre los servicios que ofrecen para un cliente.");
        assert_eq!(guess.code, "es");
    }

    #[test]
    fn test_detect_language_unknown_for_gibberish() {
        let guess = detect_language("zzz qqq xxx");
        assert_eq!(guess.code, "unknown");
    }

    #[test]
    fn test_analyze_combines_reports() {
        let analysis = analyze("Can you help me with a problem in my account?");
        assert!(!analysis.keywords.is_empty());
        assert_eq!(analysis.language.code, "en");
        assert_eq!(analysis.category, Category::Question);
    }
}
