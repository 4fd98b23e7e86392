//! Bot reply texts.
//!
//! English is the fallback for any language code the bot does not speak.

/// Reply language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    /// English.
    #[default]
    En,
    /// Russian.
    Ru,
}

impl Lang {
    /// Map a Telegram language code (`"ru"`, `"en-US"`, ...) to a reply language.
    pub fn from_code(code: &str) -> Self {
        let primary = code.split(['-', '_']).next().unwrap_or_default();
        if primary.eq_ignore_ascii_case("ru") {
            Self::Ru
        } else {
            Self::En
        }
    }

    /// Short code stored with the user.
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
        }
    }
}

/// Greeting sent after the user and chat are registered.
pub fn hello(lang: Lang, username: &str) -> String {
    match lang {
        Lang::En => format!("Hello, {username}!\nPush \"Open\" button to start using bot"),
        Lang::Ru => format!(
            "Привет, {username}!\nНажмите кнопку \"Open\", чтобы начать пользоваться ботом"
        ),
    }
}

/// Fallback reply when handling an update failed.
pub fn something_wrong(lang: Lang) -> &'static str {
    match lang {
        Lang::En => "Something went wrong\nPlease try again later",
        Lang::Ru => "Что-то пошло не так\nПожалуйста, попробуйте позже",
    }
}
