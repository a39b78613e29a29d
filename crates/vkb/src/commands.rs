use vkb_core::clock::{format_utc_offset, DriftClock};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Time,
    Help,
    Echo(String),
}

impl Command {
    /// Anything that is not a known command is echoed back.
    pub fn parse(text: &str) -> Self {
        // Chats may address the bot as `/cmd` or `/cmd@club123`.
        let word = text
            .trim()
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();

        match word.as_str() {
            "time" | "время" => Command::Time,
            "help" | "помощь" | "start" => Command::Help,
            _ => Command::Echo(text.to_string()),
        }
    }
}

pub fn respond(text: &str, clock: &DriftClock) -> String {
    match Command::parse(text) {
        Command::Time => time_reply(clock),
        Command::Help => HELP.to_string(),
        Command::Echo(t) if t.trim().is_empty() => "(empty message)".to_string(),
        Command::Echo(t) => format!("Echo: {t}"),
    }
}

const HELP: &str = "Commands:\n\
time - current time and seconds since midnight\n\
help - this message\n\
Anything else is echoed back.";

fn time_reply(clock: &DriftClock) -> String {
    match clock.now_as_local_string() {
        Ok(local) => format!(
            "{local} ({})\nSeconds since midnight: {}",
            format_utc_offset(clock.offset()),
            clock.seconds_since_local_midnight()
        ),
        Err(e) => format!("Time is unavailable: {e}"),
    }
}
