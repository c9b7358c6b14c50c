//! Line -> world operation.
//!
//! The interpreter is stateless: each call parses one trimmed line, runs at most
//! a few registry requests and returns the lines to show the caller.

use crate::direction::Direction;
use crate::help;
use crate::registry::{WorldGone, WorldHandle};
use crate::world::{Emote, Peek};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Walk,
    Look,
    Inventory,
    Say,
    Shout,
    Whisper,
    Emote,
    Get,
    Drop,
    Describe,
    Save,
    Help,
    Quit,
}

impl Verb {
    pub fn parse(word: &str) -> Option<Self> {
        let v = match word.to_ascii_lowercase().as_str() {
            "walk" | "go" | "w" | "g" => Verb::Walk,
            "look" | "/l" => Verb::Look,
            "inventory" | "/i" => Verb::Inventory,
            "say" => Verb::Say,
            "shout" | "/s" => Verb::Shout,
            "whisper" | "/w" => Verb::Whisper,
            "emote" | "/e" => Verb::Emote,
            "get" | "take" => Verb::Get,
            "drop" => Verb::Drop,
            "describe" => Verb::Describe,
            "save" => Verb::Save,
            "help" | "/h" | "?" => Verb::Help,
            "exit" | "quit" => Verb::Quit,
            _ => return None,
        };
        Some(v)
    }

    /// Key into the usage table.
    pub fn usage_key(self) -> &'static str {
        match self {
            Verb::Walk => "walk",
            Verb::Look => "look",
            Verb::Inventory => "inventory",
            Verb::Say => "say",
            Verb::Shout => "shout",
            Verb::Whisper => "whisper",
            Verb::Emote => "emote",
            Verb::Get => "get",
            Verb::Drop => "drop",
            Verb::Describe => "describe",
            Verb::Save => "save",
            Verb::Help => "help",
            Verb::Quit => "quit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Lines for the caller, without terminators.
    pub lines: Vec<String>,
    pub flow: Flow,
}

impl Reply {
    fn none() -> Self {
        Self {
            lines: Vec::new(),
            flow: Flow::Continue,
        }
    }

    fn line(s: impl Into<String>) -> Self {
        Self {
            lines: vec![s.into()],
            flow: Flow::Continue,
        }
    }

    fn text(block: &str) -> Self {
        Self {
            lines: block.lines().map(str::to_string).collect(),
            flow: Flow::Continue,
        }
    }

    fn usage(verb: Verb) -> Self {
        Self::line(
            help::lookup(verb.usage_key())
                .map(|u| u.format)
                .unwrap_or("Invalid arguments."),
        )
    }

    fn push_text(&mut self, block: Option<String>) {
        if let Some(b) = block {
            self.lines.extend(b.lines().map(str::to_string));
        }
    }
}

/// Verb and the trimmed rest of the line; `None` for a blank line.
pub fn split_command(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => Some((verb, rest.trim())),
        None => Some((line, "")),
    }
}

/// `<target> <text>`; both parts required.
pub fn split_target(rest: &str) -> Option<(&str, &str)> {
    let (who, msg) = rest.trim().split_once(char::is_whitespace)?;
    let msg = msg.trim();
    if who.is_empty() || msg.is_empty() {
        None
    } else {
        Some((who, msg))
    }
}

fn single_word(rest: &str) -> bool {
    !rest.is_empty() && !rest.contains(char::is_whitespace)
}

/// Run one input line for the connected player `name`.
pub async fn dispatch(world: &WorldHandle, name: &str, line: &str) -> Result<Reply, WorldGone> {
    let Some((word, rest)) = split_command(line) else {
        return Ok(Reply::none());
    };
    let Some(verb) = Verb::parse(word) else {
        return Ok(Reply::line(format!("Command \"{}\" is not valid.", line.trim())));
    };

    let reply = match verb {
        Verb::Walk => {
            if !single_word(rest) {
                Reply::usage(verb)
            } else if world.walk(name, rest).await? {
                Reply::text(&world.render_area(name).await?.unwrap_or_default())
            } else {
                Reply::line("You can't go in that direction.")
            }
        }
        Verb::Look => look(world, name, rest).await?,
        Verb::Inventory => {
            if rest.is_empty() {
                Reply::text(&world.inventory(name).await?.unwrap_or_default())
            } else {
                Reply::usage(verb)
            }
        }
        Verb::Say => {
            if rest.is_empty() {
                Reply::usage(verb)
            } else {
                world.say_area(name, &format!("{name} says: {rest}")).await?;
                Reply::line(format!("You say: {rest}"))
            }
        }
        Verb::Shout => {
            if rest.is_empty() {
                Reply::usage(verb)
            } else {
                world.say_world(name, rest).await?;
                Reply::none()
            }
        }
        Verb::Whisper => match split_target(rest) {
            Some((target, msg)) => {
                if world.whisper(name, target, msg).await?.nobody() {
                    Reply::line(format!("No one named {target} is here."))
                } else {
                    Reply::line(format!("You whisper to {target}: {msg}"))
                }
            }
            None => Reply::usage(verb),
        },
        Verb::Emote => match split_target(rest) {
            Some((target, key)) => {
                let report = world.emote(name, target, key).await?;
                if Emote::parse(key).is_some() && report.nobody() {
                    Reply::line(format!("No one named {target} is here."))
                } else {
                    Reply::none()
                }
            }
            None => Reply::usage(verb),
        },
        Verb::Get => {
            if rest.is_empty() {
                Reply::usage(verb)
            } else {
                let mut r = match world.get_item(name, rest).await? {
                    Some(item) => Reply::line(format!("You take the {item}.")),
                    None => Reply::line(format!("There is no {rest} here.")),
                };
                world.save_player(name).await?;
                r.push_text(world.render_area(name).await?);
                r
            }
        }
        Verb::Drop => {
            if rest.is_empty() {
                Reply::usage(verb)
            } else if !world.carries(name, rest).await? {
                Reply::line(format!("You are not carrying {rest}."))
            } else {
                let mut r = match world.drop_item(name, rest).await? {
                    Some(item) => Reply::line(format!("You drop the {item}.")),
                    None => Reply::line(format!("You can't drop {rest} here.")),
                };
                world.save_player(name).await?;
                r.push_text(world.render_area(name).await?);
                r
            }
        }
        Verb::Describe => {
            if rest.is_empty() {
                Reply::usage(verb)
            } else {
                world.describe(name, rest).await?;
                world.save_player(name).await?;
                Reply::line("Description updated.")
            }
        }
        Verb::Save => {
            if !rest.is_empty() {
                Reply::usage(verb)
            } else {
                let mut r = if world.save_player(name).await? {
                    Reply::line("Player Saved...")
                } else {
                    Reply::line("Player could not be saved.")
                };
                r.push_text(world.render_area(name).await?);
                r
            }
        }
        Verb::Help => {
            if rest.is_empty() {
                Reply {
                    lines: help::overview(),
                    flow: Flow::Continue,
                }
            } else {
                Reply {
                    lines: help::usage_lines(rest),
                    flow: Flow::Continue,
                }
            }
        }
        Verb::Quit => {
            if !rest.is_empty() {
                Reply::usage(verb)
            } else {
                world.save_player(name).await?;
                Reply {
                    lines: Vec::new(),
                    flow: Flow::Quit,
                }
            }
        }
    };
    Ok(reply)
}

async fn look(world: &WorldHandle, name: &str, rest: &str) -> Result<Reply, WorldGone> {
    if rest.is_empty() {
        return Ok(Reply::text(&world.render_area(name).await?.unwrap_or_default()));
    }
    if !single_word(rest) {
        return Ok(Reply::usage(Verb::Look));
    }
    if Direction::parse(rest).is_some() {
        return Ok(match world.peek(name, rest).await? {
            Peek::View(v) => Reply::text(&v),
            Peek::Nothing | Peek::NotADirection => Reply::line("Nothing to see."),
        });
    }
    Ok(match world.look_at(name, rest).await? {
        Some(desc) => Reply::line(desc),
        None => Reply::usage(Verb::Look),
    })
}
