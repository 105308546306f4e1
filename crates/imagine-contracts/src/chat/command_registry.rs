#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

/// `/command value` pairs that change one generation option. `action` here is
/// the setting key the value is stored under.
pub(crate) const SETTING_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "model",
        action: "model",
    },
    CommandSpec {
        command: "size",
        action: "size",
    },
    CommandSpec {
        command: "quality",
        action: "quality",
    },
    CommandSpec {
        command: "style",
        action: "style",
    },
    CommandSpec {
        command: "art",
        action: "art_style",
    },
    CommandSpec {
        command: "count",
        action: "count",
    },
    CommandSpec {
        command: "seed",
        action: "seed",
    },
    CommandSpec {
        command: "negative",
        action: "negative_prompt",
    },
    CommandSpec {
        command: "background",
        action: "background",
    },
    CommandSpec {
        command: "compression",
        action: "compression",
    },
    CommandSpec {
        command: "format",
        action: "output_format",
    },
    CommandSpec {
        command: "encoding",
        action: "response_encoding",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "models",
        action: "list_models",
    },
    CommandSpec {
        command: "settings",
        action: "show_settings",
    },
    CommandSpec {
        command: "history",
        action: "show_history",
    },
    CommandSpec {
        command: "clear",
        action: "clear_history",
    },
    CommandSpec {
        command: "logout",
        action: "clear_api_key",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const KEY_COMMAND: CommandSpec = CommandSpec {
    command: "key",
    action: "set_api_key",
};

pub(crate) const SAVE_COMMAND: CommandSpec = CommandSpec {
    command: "save",
    action: "save",
};

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/model <id>",
    "/size <WxH>",
    "/quality <level>",
    "/style <vivid|natural>",
    "/art <preset>",
    "/count <n>",
    "/seed <n|-1>",
    "/negative <text>",
    "/background <auto|transparent|opaque>",
    "/compression <0-100>",
    "/format <png|jpeg|webp>",
    "/encoding <url|b64_json>",
    "/key <api key>",
    "/logout",
    "/save <n> [path]",
    "/settings",
    "/models",
    "/history",
    "/clear",
    "/help",
    "/quit",
];
