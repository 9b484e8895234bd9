// ABOUTME: Reply rendering helpers: platform formatting and phrase translation.
// ABOUTME: Dictionary-based translation covering the canned generator replies.

use regex::Regex;
use std::sync::OnceLock;

/// Languages the phrase table covers.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "es", "fr", "de", "it"];

/// Canned-phrase translations, keyed by the English source text. Only the
/// generator's fixed replies are covered; anything else passes through
/// untranslated.
const PHRASES: &[(&str, [&str; 4])] = &[
    (
        "Hello! Welcome to our chat service. How can I assist you today?",
        [
            "¡Hola! Bienvenido a nuestro servicio de chat. ¿Cómo puedo ayudarte hoy?",
            "Bonjour ! Bienvenue sur notre service de chat. Comment puis-je vous aider aujourd'hui ?",
            "Hallo! Willkommen bei unserem Chat-Service. Wie kann ich Ihnen heute helfen?",
            "Ciao! Benvenuto al nostro servizio di chat. Come posso aiutarti oggi?",
        ],
    ),
    (
        "Hello again! How can I help you today?",
        [
            "¡Hola de nuevo! ¿Cómo puedo ayudarte hoy?",
            "Bonjour à nouveau ! Comment puis-je vous aider aujourd'hui ?",
            "Hallo nochmal! Wie kann ich Ihnen heute helfen?",
            "Ciao di nuovo! Come posso aiutarti oggi?",
        ],
    ),
    (
        "Thank you for chatting with us today. Have a great day!",
        [
            "Gracias por chatear con nosotros hoy. ¡Que tengas un buen día!",
            "Merci d'avoir discuté avec nous aujourd'hui. Passez une bonne journée !",
            "Vielen Dank für den Chat mit uns heute. Haben Sie einen schönen Tag!",
            "Grazie per aver chattato con noi oggi. Buona giornata!",
        ],
    ),
    (
        "You're welcome! Is there anything else I can help you with?",
        [
            "¡De nada! ¿Hay algo más en lo que pueda ayudarte?",
            "Je vous en prie ! Y a-t-il autre chose que je puisse faire pour vous ?",
            "Gern geschehen! Gibt es noch etwas, womit ich Ihnen helfen kann?",
            "Prego! C'è qualcos'altro in cui posso aiutarti?",
        ],
    ),
    (
        "I understand. Is there anything specific you'd like to know or discuss?",
        [
            "Entiendo. ¿Hay algo específico que te gustaría saber o discutir?",
            "Je comprends. Y a-t-il quelque chose de spécifique dont vous aimeriez discuter ?",
            "Ich verstehe. Gibt es etwas Bestimmtes, das Sie wissen möchten oder besprechen möchten?",
            "Capisco. C'è qualcosa di specifico che vorresti sapere o discutere?",
        ],
    ),
    (
        "I'm sorry to hear that. Is there anything I can do to help improve the situation?",
        [
            "Lamento escuchar eso. ¿Hay algo que pueda hacer para ayudar a mejorar la situación?",
            "Je suis désolé d'entendre cela. Y a-t-il quelque chose que je puisse faire pour améliorer la situation ?",
            "Es tut mir leid, das zu hören. Gibt es etwas, das ich tun kann, um die Situation zu verbessern?",
            "Mi dispiace sentirlo. C'è qualcosa che posso fare per migliorare la situazione?",
        ],
    ),
];

fn language_index(code: &str) -> Option<usize> {
    match code {
        "es" => Some(0),
        "fr" => Some(1),
        "de" => Some(2),
        "it" => Some(3),
        _ => None,
    }
}

/// Translate a canned reply into `language`, when the phrase table covers
/// both the phrase and the language. English and unknown languages pass
/// through; so do phrases without a table entry.
pub fn translate(text: &str, language: &str) -> String {
    let Some(idx) = language_index(language) else {
        return text.to_string();
    };
    for (source, translations) in PHRASES {
        if *source == text {
            return translations[idx].to_string();
        }
    }
    text.to_string()
}

/// Format a reply for Slack: dash/asterisk list markers become bullets.
/// Slack renders its own markdown flavor, so no other rewriting is done.
pub fn format_for_slack(text: &str) -> String {
    static LIST_ITEM: OnceLock<Regex> = OnceLock::new();
    let list_item = LIST_ITEM.get_or_init(|| Regex::new(r"(?m)^\s*[-*]\s+").expect("static pattern compiles"));
    list_item.replace_all(text, "• ").to_string()
}

/// Truncate a reply to `max_len` characters, ellipsized. Character-based so
/// multi-byte text never splits mid-codepoint.
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_len.saturating_sub(3)).collect();
    format!("{cut}...")
}
