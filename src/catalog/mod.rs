//! Service price catalog answered inside ticket channels.
//!
//! The catalog is a JSON array of service groups:
//! `[{"type": "Exploration", "items": [{"name": "...", "price": "..."}]}]`.
//! Prices are free text, searched the same way as names.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::channels::{Embed, OutgoingMessage};
use crate::tickets::notices::ACCENT_COLOR;

/// Discord caps an embed at 25 fields.
const MAX_FIELDS_PER_EMBED: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceItem {
    pub name: String,
    pub price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGroup {
    #[serde(rename = "type")]
    pub kind: String,
    pub items: Vec<ServiceItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCommand {
    ListAll,
    ByName(String),
    ByPrice(String),
}

impl CatalogCommand {
    pub fn parse(text: &str) -> Option<Self> {
        let content = text.trim().to_lowercase();

        if content == "!prices" || content == "!banggia" {
            return Some(Self::ListAll);
        }

        let keyword = |prefixes: &[&str]| {
            prefixes
                .iter()
                .find_map(|p| content.strip_prefix(p))
                .map(|rest| rest.trim().to_string())
                .filter(|k| !k.is_empty())
        };

        if let Some(k) = keyword(&["!findprice ", "!timgia "]) {
            return Some(Self::ByPrice(k));
        }
        keyword(&["!find ", "!tim "]).map(Self::ByName)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    groups: Vec<ServiceGroup>,
}

impl ServiceCatalog {
    pub fn new(groups: Vec<ServiceGroup>) -> Self {
        Self { groups }
    }

    /// Missing or malformed catalog files yield an empty catalog.
    pub fn load(path: &Path) -> Self {
        let groups = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Vec<ServiceGroup>>(&content) {
                Ok(groups) => groups,
                Err(e) => {
                    warn!("Service catalog {} is malformed: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!("Service catalog {} unavailable: {}", path.display(), e);
                Vec::new()
            }
        };
        info!("Loaded {} service groups from {}", groups.len(), path.display());
        Self { groups }
    }

    pub fn groups(&self) -> &[ServiceGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn search_by_name(&self, keyword: &str) -> Vec<ServiceGroup> {
        self.filter(keyword, |item| &item.name)
    }

    pub fn search_by_price(&self, keyword: &str) -> Vec<ServiceGroup> {
        self.filter(keyword, |item| &item.price)
    }

    fn filter<F>(&self, keyword: &str, field: F) -> Vec<ServiceGroup>
    where
        F: Fn(&ServiceItem) -> &String,
    {
        let keyword = keyword.to_lowercase();
        self.groups
            .iter()
            .filter_map(|group| {
                let items: Vec<ServiceItem> = group
                    .items
                    .iter()
                    .filter(|item| field(item).to_lowercase().contains(&keyword))
                    .cloned()
                    .collect();
                if items.is_empty() {
                    None
                } else {
                    Some(ServiceGroup {
                        kind: group.kind.clone(),
                        items,
                    })
                }
            })
            .collect()
    }

    /// Messages answering `command`, one embed per service group.
    pub fn answer(&self, command: &CatalogCommand) -> Vec<OutgoingMessage> {
        let (groups, empty_notice) = match command {
            CatalogCommand::ListAll => (self.groups.clone(), "❌ No services are listed yet."),
            CatalogCommand::ByName(k) => (self.search_by_name(k), "❌ No service found with that name."),
            CatalogCommand::ByPrice(k) => (self.search_by_price(k), "❌ No service found at that price."),
        };

        if groups.is_empty() {
            return vec![OutgoingMessage::text(empty_notice)];
        }

        groups
            .iter()
            .flat_map(render)
            .map(OutgoingMessage::embed)
            .collect()
    }
}

pub fn render(group: &ServiceGroup) -> Vec<Embed> {
    if group.items.is_empty() {
        return vec![Embed::titled(format!("📜 {}", group.kind)).with_color(ACCENT_COLOR)];
    }

    group
        .items
        .chunks(MAX_FIELDS_PER_EMBED)
        .map(|chunk| {
            chunk.iter().fold(
                Embed::titled(format!("📜 {}", group.kind)).with_color(ACCENT_COLOR),
                |embed, item| embed.with_field(&item.name, format!("💰 Price: {}", item.price)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::new(vec![
            ServiceGroup {
                kind: "Exploration".to_string(),
                items: vec![
                    ServiceItem {
                        name: "Mondstadt 100%".to_string(),
                        price: "150k".to_string(),
                    },
                    ServiceItem {
                        name: "Liyue 100%".to_string(),
                        price: "200k".to_string(),
                    },
                ],
            },
            ServiceGroup {
                kind: "Daily".to_string(),
                items: vec![ServiceItem {
                    name: "Daily commissions (30 days)".to_string(),
                    price: "150k".to_string(),
                }],
            },
        ])
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(CatalogCommand::parse("!prices"), Some(CatalogCommand::ListAll));
        assert_eq!(CatalogCommand::parse("  !BANGGIA "), Some(CatalogCommand::ListAll));
        assert_eq!(
            CatalogCommand::parse("!find Liyue"),
            Some(CatalogCommand::ByName("liyue".to_string()))
        );
        assert_eq!(
            CatalogCommand::parse("!tim mond"),
            Some(CatalogCommand::ByName("mond".to_string()))
        );
        assert_eq!(
            CatalogCommand::parse("!timgia 150k"),
            Some(CatalogCommand::ByPrice("150k".to_string()))
        );
        assert_eq!(
            CatalogCommand::parse("!findprice 200"),
            Some(CatalogCommand::ByPrice("200".to_string()))
        );
        assert_eq!(CatalogCommand::parse("!find   "), None);
        assert_eq!(CatalogCommand::parse("hello"), None);
    }

    #[test]
    fn test_search_by_name_keeps_group_structure() {
        let found = catalog().search_by_name("LIYUE");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, "Exploration");
        assert_eq!(found[0].items.len(), 1);
    }

    #[test]
    fn test_search_by_price_spans_groups() {
        let found = catalog().search_by_price("150k");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_answer_not_found() {
        let replies = catalog().answer(&CatalogCommand::ByName("inazuma".to_string()));
        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].content.as_deref(),
            Some("❌ No service found with that name.")
        );
    }

    #[test]
    fn test_answer_list_all_one_embed_per_group() {
        let replies = catalog().answer(&CatalogCommand::ListAll);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].embeds[0].fields.len(), 2);
        assert_eq!(replies[0].embeds[0].fields[0].value, "💰 Price: 150k");
    }

    #[test]
    fn test_large_group_is_split_across_embeds() {
        let group = ServiceGroup {
            kind: "Bulk".to_string(),
            items: (0..30)
                .map(|i| ServiceItem {
                    name: format!("item {i}"),
                    price: "1k".to_string(),
                })
                .collect(),
        };
        let embeds = render(&group);
        assert_eq!(embeds.len(), 2);
        assert_eq!(embeds[0].fields.len(), 25);
        assert_eq!(embeds[1].fields.len(), 5);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ServiceCatalog::load(&dir.path().join("services.json")).is_empty());
    }

    #[test]
    fn test_load_reads_grouped_services_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        std::fs::write(
            &path,
            r#"[{"type":"Boss","items":[{"name":"Weekly bosses","price":"50k"}]}]"#,
        )
        .unwrap();
        let catalog = ServiceCatalog::load(&path);
        assert_eq!(catalog.groups()[0].items[0].price, "50k");
    }
}
