use std::sync::LazyLock;

use regex::Regex;

use crate::steam::keyvalues::{self, KeyValues};

const ACCOUNT_NAME_KEYS: [&str; 3] = ["AccountName", "accountName", "account_name"];
const PERSONA_NAME_KEYS: [&str; 3] = ["PersonaName", "personaName", "persona_name"];

/// An account as read from the roster file, before stats are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFragment {
    pub steam_id: Option<String>,
    pub account_name: String,
    pub persona_name: String,
}

/// One known layout of the roster document.
struct RosterShape {
    name: &'static str,
    users: fn(&KeyValues) -> Option<&KeyValues>,
}

fn top_level_users(doc: &KeyValues) -> Option<&KeyValues> {
    doc.get_map("users")
}

fn nested_loginusers(doc: &KeyValues) -> Option<&KeyValues> {
    doc.path(&["loginusers", "users"])
}

fn root_keyed_by_id(doc: &KeyValues) -> Option<&KeyValues> {
    Some(doc)
}

const ROSTER_SHAPES: [RosterShape; 3] = [
    RosterShape {
        name: "users",
        users: top_level_users,
    },
    RosterShape {
        name: "loginusers.users",
        users: nested_loginusers,
    },
    RosterShape {
        name: "root",
        users: root_keyed_by_id,
    },
];

/// Reads accounts out of roster text: structured first, patterns second.
pub fn extract_accounts(text: &str) -> Vec<AccountFragment> {
    let doc = keyvalues::parse(text);
    if let Some(accounts) = from_document(&doc) {
        return accounts;
    }

    tracing::info!("No accounts found in parsed roster, falling back to pattern scan");
    from_patterns(text)
}

/// Tries each roster shape in order; the first with an accepted account wins.
pub fn from_document(doc: &KeyValues) -> Option<Vec<AccountFragment>> {
    ROSTER_SHAPES.iter().find_map(|shape| {
        let accounts = accounts_in(shape, doc)?;
        tracing::debug!(shape = shape.name, count = accounts.len(), "Roster shape matched");
        Some(accounts)
    })
}

fn accounts_in(shape: &RosterShape, doc: &KeyValues) -> Option<Vec<AccountFragment>> {
    let users = (shape.users)(doc)?;
    if users.is_empty() {
        return None;
    }
    let accounts: Vec<AccountFragment> = users
        .maps()
        .filter_map(|(steam_id, fields)| {
            let account_name = first_present(fields, &ACCOUNT_NAME_KEYS)?;
            let persona_name = first_present(fields, &PERSONA_NAME_KEYS).unwrap_or(account_name);
            Some(AccountFragment {
                steam_id: Some(steam_id.to_string()),
                account_name: account_name.to_string(),
                persona_name: persona_name.to_string(),
            })
        })
        .collect();

    if accounts.is_empty() {
        None
    } else {
        Some(accounts)
    }
}

fn first_present<'a>(fields: &'a KeyValues, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| fields.get_str(key))
        .find(|value| !value.is_empty())
}

static ACCOUNT_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""AccountName"\s+"([^"]+)""#).ok());
static PERSONA_NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""PersonaName"\s+"([^"]+)""#).ok());
static STEAM_ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""(\d+)""#).ok());

/// Ids are only trusted near the top of the file or right after a `users`
/// marker.
const ID_HEAD_WINDOW: usize = 100;
const ID_MARKER_WINDOW: usize = 20;

/// Best-effort scan for documents the parser rejected.
///
/// Names and ids are collected independently and paired by position when the
/// counts agree. Nothing checks that the pairs belong together, so a file with
/// unexpected numbers near a `users` marker can mis-pair accounts.
pub fn from_patterns(text: &str) -> Vec<AccountFragment> {
    let account_names = captures(&ACCOUNT_NAME_PATTERN, text);
    let persona_names = captures(&PERSONA_NAME_PATTERN, text);
    let steam_ids: Vec<&str> = STEAM_ID_PATTERN.as_ref().map_or_else(Vec::new, |re| {
        re.captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                id_in_roster_position(text, whole.start()).then_some(caps.get(1)?.as_str())
            })
            .collect()
    });

    tracing::debug!(
        account_names = account_names.len(),
        persona_names = persona_names.len(),
        steam_ids = steam_ids.len(),
        "Pattern scan results"
    );

    let paired = account_names.len() == steam_ids.len();
    account_names
        .iter()
        .enumerate()
        .map(|(index, name)| AccountFragment {
            steam_id: if paired {
                steam_ids.get(index).map(|id| (*id).to_string())
            } else {
                None
            },
            account_name: (*name).to_string(),
            persona_name: persona_names.get(index).unwrap_or(name).to_string(),
        })
        .collect()
}

fn captures<'t>(pattern: &LazyLock<Option<Regex>>, text: &'t str) -> Vec<&'t str> {
    pattern.as_ref().map_or_else(Vec::new, |re| {
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect()
    })
}

fn id_in_roster_position(text: &str, start: usize) -> bool {
    if start < ID_HEAD_WINDOW {
        return true;
    }
    let mut from = start.saturating_sub(ID_MARKER_WINDOW);
    while !text.is_char_boundary(from) {
        from += 1;
    }
    text.get(from..start).is_some_and(|before| before.contains("users"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(id: Option<&str>, account: &str, persona: &str) -> AccountFragment {
        AccountFragment {
            steam_id: id.map(str::to_string),
            account_name: account.to_string(),
            persona_name: persona.to_string(),
        }
    }

    #[test]
    fn reads_each_known_shape() {
        let shapes = [
            "\"users\" { \"7656\" { \"AccountName\" \"alice\" \"PersonaName\" \"Alice\" } }",
            "\"loginusers\" { \"users\" { \"7656\" { \"AccountName\" \"alice\" \"PersonaName\" \"Alice\" } } }",
            "\"7656\" { \"AccountName\" \"alice\" \"PersonaName\" \"Alice\" }",
        ];
        for text in shapes {
            assert_eq!(
                extract_accounts(text),
                vec![fragment(Some("7656"), "alice", "Alice")],
                "shape {text:?}"
            );
        }
    }

    #[test]
    fn accepts_alternate_field_casing() {
        let text = "\"users\" { \"1\" { \"account_name\" \"alice\" } \"2\" { \"accountName\" \"bob\" \"personaName\" \"Bob\" } }";
        assert_eq!(
            extract_accounts(text),
            vec![
                fragment(Some("1"), "alice", "alice"),
                fragment(Some("2"), "bob", "Bob"),
            ]
        );
    }

    #[test]
    fn skips_candidates_without_account_name() {
        let text = "\"users\" { \"1\" { \"PersonaName\" \"Ghost\" } \"2\" { \"AccountName\" \"\" } \"3\" { \"AccountName\" \"carol\" } }";
        assert_eq!(
            extract_accounts(text),
            vec![fragment(Some("3"), "carol", "carol")]
        );
    }

    #[test]
    fn empty_users_block_falls_through_to_next_shape() {
        let text = "\"users\" { } \"loginusers\" { \"users\" { \"9\" { \"AccountName\" \"dave\" } } }";
        assert_eq!(
            extract_accounts(text),
            vec![fragment(Some("9"), "dave", "dave")]
        );
        assert_eq!(from_document(&KeyValues::new()), None);
    }

    #[test]
    fn pattern_scan_zips_names_and_ids_in_order() {
        let text = concat!(
            "\"users\" \"11\" { \"AccountName\" \"alice\" \"PersonaName\" \"Alice\"\n",
            "padding padding padding padding padding padding padding padding padding\n",
            "\"users\" \"22\" { \"AccountName\" \"bob\" \"PersonaName\" \"Bob\"\n",
        );
        assert!(keyvalues::try_parse(text).is_err());
        assert_eq!(
            extract_accounts(text),
            vec![
                fragment(Some("11"), "alice", "Alice"),
                fragment(Some("22"), "bob", "Bob"),
            ]
        );
    }

    #[test]
    fn pattern_scan_drops_ids_when_counts_differ() {
        let text = concat!(
            "\"users\" \"11\" { \"AccountName\" \"alice\"\n",
            "padding padding padding padding padding padding padding padding padding\n",
            "\"AccountName\" \"bob\" \"PersonaName\" \"Bob\" {\n",
        );
        assert_eq!(
            extract_accounts(text),
            vec![fragment(None, "alice", "Bob"), fragment(None, "bob", "bob")]
        );
    }

    #[test]
    fn pattern_scan_ignores_numbers_far_from_users_marker() {
        let text = format!(
            "{}\"Timestamp\" \"1700000000\" \"AccountName\" \"alice\" {{",
            " ".repeat(200)
        );
        assert_eq!(extract_accounts(&text), vec![fragment(None, "alice", "alice")]);
    }

    #[test]
    fn pattern_scan_on_garbage_yields_nothing() {
        assert!(extract_accounts("not a roster { at all").is_empty());
        assert!(extract_accounts("").is_empty());
    }
}
