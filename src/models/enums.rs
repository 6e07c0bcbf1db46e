use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Serde names match `as_str`, so JSON and SQLite share one spelling.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(HistoryFormat {
    Markdown => "markdown",
    Html => "html",
    Json => "json",
    PlainText => "plain_text",
});

str_enum!(HistoryType {
    Complete => "complete",
    Summary => "summary",
    Chronological => "chronological",
    BySystems => "by_systems",
});

str_enum!(Language {
    Es => "es",
    En => "en",
});

str_enum!(AppointmentStatus {
    Scheduled => "scheduled",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

impl Default for HistoryFormat {
    fn default() -> Self {
        HistoryFormat::Markdown
    }
}

impl Default for HistoryType {
    fn default() -> Self {
        HistoryType::Complete
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Es
    }
}
