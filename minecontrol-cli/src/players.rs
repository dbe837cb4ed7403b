//! Parsing of the server's `/list` output.

use serde::Serialize;

/// Who is online, according to `/list`.
///
/// Understands both `There are 2 of a max of 20 players online: alice, bob` and the older
/// `There are 2/20 players online:` followed by the names. Counts the server did not report are
/// left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerList {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    pub players: Vec<String>,
    /// The output as the server sent it.
    pub raw: String,
}

impl PlayerList {
    pub fn parse(output: &str) -> Self {
        let text = strip_formatting(output);

        let (header, names) = match text.split_once(':') {
            Some((header, names)) => (header, names),
            None => (text.as_str(), ""),
        };

        let mut counts = numbers(header);
        let players = names
            .split(|c: char| c == ',' || c == '\n')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        PlayerList {
            online: counts.next(),
            max: counts.next(),
            players,
            raw: output.to_string(),
        }
    }

    /// Player names are case insensitive.
    pub fn contains(&self, username: &str) -> bool {
        self.players
            .iter()
            .any(|player| player.eq_ignore_ascii_case(username))
    }
}

/// Removes `§` colour and style codes.
fn strip_formatting(text: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            stripped.push(c);
        }
    }
    stripped
}

fn numbers(text: &str) -> impl Iterator<Item = u32> + '_ {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .filter_map(|run| run.parse().ok())
}
