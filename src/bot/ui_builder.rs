//! UI Builder module for formatting bot replies

use teloxide::utils::markdown::{bold, code_inline, escape};

// Import localization
use crate::localization::{t_args_lang, t_lang};

// Import admit card types
use crate::admit_card_model::{Field, FormNumber, StudentRecord};

/// Fields shown in the document caption, with their emoji
pub const CAPTION_FIELDS: &[(Field, &str)] = &[
    (Field::Name, "👤"),
    (Field::Father, "👨"),
    (Field::Roll, "🔢"),
    (Field::College, "🎓"),
    (Field::Center, "🏫"),
];

/// Longest value shown in a caption line; Telegram caps captions at 1024 characters
const MAX_VALUE_CHARS: usize = 150;

/// Format the MarkdownV2 caption sent with an admit card
pub fn format_caption(form_number: &FormNumber, record: &StudentRecord, language_code: Option<&str>) -> String {
    let mut lines = vec![
        format!("✅ {}", bold(&escape(&t_lang("caption-title", language_code)))),
        format!(
            "📄 {}",
            escape(&t_args_lang(
                "form-number-label",
                &[("form_number", form_number.as_str())],
                language_code
            ))
        ),
    ];

    for (field, emoji) in CAPTION_FIELDS {
        let label = t_lang(&format!("field-{}", field.key()), language_code);
        lines.push(format!(
            "{} {}: {}",
            emoji,
            escape(&label),
            code_inline(&truncate_value(record.get(*field)))
        ));
    }

    if record.found_count() == 0 {
        lines.push(escape(&t_lang("caption-details-missing", language_code)));
    }

    lines.join("\n")
}

/// Welcome text for /start
pub fn format_welcome(language_code: Option<&str>) -> String {
    format!(
        "👋 {}\n\n{}\n{}",
        t_lang("welcome-title", language_code),
        t_lang("welcome-description", language_code),
        t_lang("welcome-send-number", language_code)
    )
}

/// Help text for /help
pub fn format_help(language_code: Option<&str>) -> String {
    [
        t_lang("help-title", language_code),
        t_lang("help-step1", language_code),
        t_lang("help-step2", language_code),
        t_lang("help-step3", language_code),
        t_lang("help-commands", language_code),
    ]
    .join("\n\n")
}

fn truncate_value(value: &str) -> String {
    if value.chars().count() > MAX_VALUE_CHARS {
        let kept: String = value.chars().take(MAX_VALUE_CHARS - 1).collect();
        format!("{kept}…")
    } else {
        value.to_string()
    }
}
