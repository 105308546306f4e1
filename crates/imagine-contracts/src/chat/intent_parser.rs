use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, KEY_COMMAND, NO_ARG_COMMANDS, SAVE_COMMAND, SETTING_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub prompt: Option<String>,
    pub settings_update: BTreeMap<String, Value>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            prompt: None,
            settings_update: BTreeMap::new(),
            command_args: BTreeMap::new(),
        }
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    }
}

fn parse_save_args(arg: &str, intent: &mut Intent) {
    let parts = split_args(arg);
    let number = parts
        .first()
        .and_then(|value| value.parse::<u64>().ok())
        .map(|value| Value::Number(value.into()))
        .unwrap_or(Value::Null);
    intent.command_args.insert("number".to_string(), number);
    intent.command_args.insert(
        "path".to_string(),
        parts
            .get(1)
            .cloned()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
}

/// Turns one REPL line into an intent. Slash commands configure the session;
/// anything else is a prompt to generate from.
pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop");
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(setting) = find_action(&command, SETTING_COMMANDS) {
                let mut intent = Intent::new("update_setting");
                intent
                    .settings_update
                    .insert(setting.to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if command == KEY_COMMAND.command {
                let mut intent = Intent::new(KEY_COMMAND.action);
                intent
                    .command_args
                    .insert("key".to_string(), Value::String(arg.to_string()));
                return intent;
            }

            if command == SAVE_COMMAND.command {
                let mut intent = Intent::new(SAVE_COMMAND.action);
                parse_save_args(arg, &mut intent);
                return intent;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action);
            }

            let mut intent = Intent::new("unknown");
            intent
                .command_args
                .insert("command".to_string(), Value::String(command));
            intent
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return intent;
        }
    }

    let mut intent = Intent::new("generate");
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}
