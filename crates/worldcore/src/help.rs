//! Per-command usage table.

pub struct Usage {
    pub command: &'static str,
    pub hint: &'static str,
    pub format: &'static str,
}

pub const USAGE: &[Usage] = &[
    Usage {
        command: "look",
        hint: "Inspect surroundings/others",
        format: "Command format is: look <name> || look <direction> || look",
    },
    Usage {
        command: "walk",
        hint: "Walk/go about",
        format: "Command format is: walk/go <direction>",
    },
    Usage {
        command: "say",
        hint: "Speak to room",
        format: "Command format is: say <message>",
    },
    Usage {
        command: "shout",
        hint: "Speak to everyone in the world",
        format: "Command format is: shout|/s <message>",
    },
    Usage {
        command: "whisper",
        hint: "Speak to person",
        format: "Command format is: whisper|/w <name> <message>",
    },
    Usage {
        command: "emote",
        hint: "Sends emote to person in room",
        format: "Command format is: emote|/e <person> <wink|smile|frown|wave|nod>",
    },
    Usage {
        command: "get",
        hint: "Retrieve item from room",
        format: "Command format is: take/get <item>",
    },
    Usage {
        command: "drop",
        hint: "Drop item in room",
        format: "Command format is: drop <item>",
    },
    Usage {
        command: "inventory",
        hint: "List what you carry",
        format: "Command format is: inventory|/i",
    },
    Usage {
        command: "describe",
        hint: "Describes yourself for the others",
        format: "Command format is: describe <message>",
    },
    Usage {
        command: "save",
        hint: "Save your player",
        format: "Command format is: save",
    },
    Usage {
        command: "help",
        hint: "See command info",
        format: "Command format is: help <command>",
    },
    Usage {
        command: "quit",
        hint: "Save and leave the world",
        format: "Command format is: quit/exit",
    },
];

/// Look up by canonical name or a plain-word alias.
pub fn lookup(command: &str) -> Option<&'static Usage> {
    let c = command.trim().to_ascii_lowercase();
    let canonical = match c.as_str() {
        "go" => "walk",
        "take" => "get",
        "exit" => "quit",
        other => other,
    };
    USAGE.iter().find(|u| u.command == canonical)
}

/// Hint and format lines for one command.
pub fn usage_lines(command: &str) -> Vec<String> {
    match lookup(command) {
        Some(u) => vec![format!("{}: {}", u.command, u.hint), u.format.to_string()],
        None => vec![format!("No help for \"{}\".", command.trim())],
    }
}

/// One line per command.
pub fn overview() -> Vec<String> {
    let mut out = vec!["Commands:".to_string()];
    out.extend(USAGE.iter().map(|u| format!("  {:<10} {}", u.command, u.hint)));
    out.push("Type help <command> for details.".to_string());
    out
}
