//! Bracket-tag record format shared by area and player files.
//!
//! A file is a run of `[tag]value` records. A value extends from the `]` to the
//! next `[` (or end of text) and is trimmed. Tags are case-insensitive; tags a
//! record type doesn't know are skipped. List values are comma separated.

use crate::direction::Direction;
use crate::model::{Area, AreaId, Player};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no [tag] markers found")]
    NoTags,
    #[error("tag opened at byte {offset} is never closed")]
    UnterminatedTag { offset: usize },
    #[error("[{tag}] value {value:?} is not a valid integer")]
    BadInteger { tag: &'static str, value: String },
    #[error("[exits] lists {count} entries; at most {max} allowed", max = Direction::COUNT)]
    TooManyExits { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<'a> {
    /// Lowercased tag name.
    pub tag: String,
    /// Raw value, untrimmed.
    pub value: &'a str,
}

/// Split text into records. Anything before the first `[` is ignored.
pub fn tokenize(text: &str) -> Result<Vec<Record<'_>>, ParseError> {
    let Some(mut open) = text.find('[') else {
        return Err(ParseError::NoTags);
    };

    let mut out = Vec::new();
    loop {
        let close = text[open + 1..]
            .find(']')
            .map(|j| open + 1 + j)
            .ok_or(ParseError::UnterminatedTag { offset: open })?;
        let tag = text[open + 1..close].trim().to_ascii_lowercase();

        let start = close + 1;
        let next = text[start..].find('[').map(|j| start + j);
        let end = next.unwrap_or(text.len());
        out.push(Record {
            tag,
            value: &text[start..end],
        });

        match next {
            Some(n) => open = n,
            None => return Ok(out),
        }
    }
}

pub fn decode_area(text: &str) -> Result<Area, ParseError> {
    let mut a = Area::default();
    for r in tokenize(text)? {
        let v = r.value.trim();
        match r.tag.as_str() {
            "title" => a.title = v.to_string(),
            "description" => a.description = v.to_string(),
            "exits" => a.exits = parse_exits(v)?,
            "items" => a.items.extend(split_list(v)),
            "id" => a.id = parse_int("id", v)?,
            _ => {}
        }
    }
    Ok(a)
}

pub fn decode_player(text: &str) -> Result<Player, ParseError> {
    let mut p = Player::default();
    for r in tokenize(text)? {
        let v = r.value.trim();
        match r.tag.as_str() {
            "description" => p.description = v.to_string(),
            "name" => p.name = v.to_string(),
            "password" => p.password_hash = v.to_string(),
            "location" => p.location = parse_int("location", v)?,
            "inventory" => p.inventory.extend(split_list(v)),
            _ => {}
        }
    }
    Ok(p)
}

pub fn encode_area(a: &Area) -> String {
    let exits = a
        .exits
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "[title]{}\n[description]{}\n[items]{}\n[exits]{}\n",
        scrub_value(&a.title),
        scrub_value(&a.description),
        join_list(&a.items),
        exits
    )
}

pub fn encode_player(p: &Player) -> String {
    format!(
        "[description]{}\n[name]{}\n[password]{}\n[location]{}\n[inventory]{}\n",
        scrub_value(&p.description),
        scrub_value(&p.name),
        scrub_value(&p.password_hash),
        p.location,
        join_list(&p.inventory)
    )
}

/// Text that can be stored as a value and read back unchanged: trimmed, and
/// with `[` (which would open a new record) replaced by `(`.
pub fn scrub_value(v: &str) -> String {
    v.trim().replace('[', "(")
}

/// Like [`scrub_value`], and `,` becomes `;` so the entry stays one entry.
pub fn scrub_item(v: &str) -> String {
    scrub_value(v).replace(',', ";")
}

fn join_list(items: &[String]) -> String {
    items
        .iter()
        .map(|it| scrub_item(it))
        .filter(|it| !it.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

fn split_list(v: &str) -> impl Iterator<Item = String> + '_ {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_int(tag: &'static str, v: &str) -> Result<AreaId, ParseError> {
    v.parse().map_err(|_| ParseError::BadInteger {
        tag,
        value: v.to_string(),
    })
}

/// Positional exit list; missing trailing slots and empty entries are 0.
fn parse_exits(v: &str) -> Result<[AreaId; Direction::COUNT], ParseError> {
    let mut exits = [0; Direction::COUNT];
    if v.is_empty() {
        return Ok(exits);
    }
    let parts = v.split(',').map(str::trim).collect::<Vec<_>>();
    if parts.len() > Direction::COUNT {
        return Err(ParseError::TooManyExits { count: parts.len() });
    }
    for (slot, part) in exits.iter_mut().zip(parts) {
        if !part.is_empty() {
            *slot = parse_int("exits", part)?;
        }
    }
    Ok(exits)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALL: &str = "[title]The Great Hall\n\
[Description]A vaulted hall. Dust hangs in the air.\n\
[items]sword , lamp,\n\
[EXITS] 2, 0, 3 ,0,0,4\n\
[colour]grey\n";

    #[test]
    fn decodes_area_fields() {
        let a = decode_area(HALL).unwrap();
        assert_eq!(a.title, "The Great Hall");
        assert_eq!(a.description, "A vaulted hall. Dust hangs in the air.");
        assert_eq!(a.items, vec!["sword".to_string(), "lamp".to_string()]);
        assert_eq!(a.exits, [2, 0, 3, 0, 0, 4]);
        assert!(a.players.is_empty());
    }

    #[test]
    fn records_need_no_separator() {
        let a = decode_area("[title]Hut[exits]5[id]9").unwrap();
        assert_eq!(a.title, "Hut");
        assert_eq!(a.exits, [5, 0, 0, 0, 0, 0]);
        assert_eq!(a.id, 9);
    }

    #[test]
    fn decodes_player_fields() {
        let text = "[description]Tall and grim.\n[name]Bob_01\n[password]4c63323c\n\
[location]3\n[inventory] sword,lamp,";
        let p = decode_player(text).unwrap();
        assert_eq!(p.name, "Bob_01");
        assert_eq!(p.description, "Tall and grim.");
        assert_eq!(p.password_hash, "4c63323c");
        assert_eq!(p.location, 3);
        assert_eq!(p.inventory, vec!["sword".to_string(), "lamp".to_string()]);
        assert_eq!(p.outbox, None);
    }

    #[test]
    fn no_markers_is_a_parse_error() {
        assert_eq!(decode_area(""), Err(ParseError::NoTags));
        assert_eq!(decode_area("just some words"), Err(ParseError::NoTags));
        assert_eq!(decode_player("\n\n"), Err(ParseError::NoTags));
    }

    #[test]
    fn unterminated_tag_is_a_parse_error() {
        assert_eq!(
            decode_area("[title]ok\n[descr"),
            Err(ParseError::UnterminatedTag { offset: 10 })
        );
    }

    #[test]
    fn bad_numbers_are_parse_errors() {
        assert!(matches!(
            decode_area("[exits]1,x"),
            Err(ParseError::BadInteger { tag: "exits", .. })
        ));
        assert!(matches!(
            decode_player("[location]-1"),
            Err(ParseError::BadInteger { tag: "location", .. })
        ));
        assert_eq!(
            decode_area("[exits]1,2,3,4,5,6,7"),
            Err(ParseError::TooManyExits { count: 7 })
        );
    }

    #[test]
    fn area_encode_order_and_reparse() {
        let a = decode_area(HALL).unwrap();
        let text = encode_area(&a);
        let tags = tokenize(&text)
            .unwrap()
            .into_iter()
            .map(|r| r.tag)
            .collect::<Vec<_>>();
        assert_eq!(tags, vec!["title", "description", "items", "exits"]);

        let b = decode_area(&text).unwrap();
        assert_eq!(b, a);
        assert_eq!(encode_area(&b), text);
    }

    #[test]
    fn player_encode_order_and_reparse() {
        let p = Player {
            name: "Alice".to_string(),
            password_hash: "c21".to_string(),
            description: "Has a hat.".to_string(),
            location: 4,
            inventory: vec!["hat".to_string(), "old map".to_string()],
            outbox: None,
        };
        let text = encode_player(&p);
        let tags = tokenize(&text)
            .unwrap()
            .into_iter()
            .map(|r| r.tag)
            .collect::<Vec<_>>();
        assert_eq!(
            tags,
            vec!["description", "name", "password", "location", "inventory"]
        );
        assert_eq!(decode_player(&text).unwrap(), p);
    }

    #[test]
    fn values_cannot_open_records() {
        let p = Player {
            name: "Alice".to_string(),
            password_hash: "c21".to_string(),
            description: "grinning [inventory]crown".to_string(),
            location: 2,
            inventory: vec!["hat".to_string(), "bag, small".to_string()],
            outbox: None,
        };
        let q = decode_player(&encode_player(&p)).unwrap();
        assert_eq!(q.description, "grinning (inventory]crown");
        assert_eq!(q.name, "Alice");
        assert_eq!(q.location, 2);
        assert_eq!(q.inventory, vec!["hat".to_string(), "bag; small".to_string()]);

        let q = decode_player(&encode_player(&Player {
            description: "a [b".to_string(),
            ..p.clone()
        }))
        .unwrap();
        assert_eq!(q.description, "a (b");
        assert_eq!(q.name, "Alice");
        assert_eq!(q.password_hash, "c21");

        let a = Area {
            title: "[exits]9".to_string(),
            items: vec!["[id]3".to_string()],
            exits: [1, 0, 0, 0, 0, 0],
            ..Area::default()
        };
        let b = decode_area(&encode_area(&a)).unwrap();
        assert_eq!(b.title, "(exits]9");
        assert_eq!(b.items, vec!["(id]3".to_string()]);
        assert_eq!(b.exits, [1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn stray_close_brackets_survive() {
        let a = decode_area("[title]Room ]1[exits]2").unwrap();
        assert_eq!(a.title, "Room ]1");
        assert_eq!(decode_area(&encode_area(&a)).unwrap(), a);
    }

    #[test]
    fn empty_lists_round_trip() {
        let p = Player {
            name: "Carol".to_string(),
            ..Player::default()
        };
        let q = decode_player(&encode_player(&p)).unwrap();
        assert!(q.inventory.is_empty());
        assert_eq!(q, p);
    }
}
