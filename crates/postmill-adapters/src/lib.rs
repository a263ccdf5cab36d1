//! Post adapters: field grammars, block extraction and catalog enrichment for each ingest store.

pub mod blocks;
pub mod catalog;
pub mod enrich;
pub mod feed;
pub mod grammar;

use postmill_core::{sub, Diagnostic, FieldSpec, Grammar, Post, Record, StoreKind, SubLabel};
use postmill_storage::FetchError;
use serde_json::Value;
use thiserror::Error;

pub use catalog::{Catalog, EntityCatalog, RoleBadgeCatalog};
pub use enrich::{resolve_author, resolve_roles_and_badges, Unresolved};
pub use feed::{decode_feed, FeedPayload, FeedSource, FileFeed, HttpFeed};
pub use grammar::{parse, Parsed};

pub const CRATE_NAME: &str = "postmill-adapters";

pub const EVENT_BACKGROUND_DEFAULT: &str = "linear-gradient(45deg, #FDEB71, #F8D800)";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error("fetching feed: {0}")]
    Fetch(#[from] FetchError),
    #[error("decoding feed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Post attribute copied verbatim into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostField {
    Id,
    Message,
    CreatedTime,
    Permalink,
    ImageUrl,
}

impl PostField {
    pub fn key(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Message => "message",
            Self::CreatedTime => "created_time",
            Self::Permalink => "permalink_url",
            Self::ImageUrl => "full_picture",
        }
    }

    fn value(self, post: &Post) -> Value {
        match self {
            Self::Id => Value::String(post.id.clone()),
            Self::Message => Value::String(post.text.clone()),
            Self::CreatedTime => Value::String(post.created_time.clone()),
            Self::Permalink => post.permalink.clone().map_or(Value::Null, Value::String),
            Self::ImageUrl => post.image_url.clone().map_or(Value::Null, Value::String),
        }
    }
}

/// A record produced from one post, before merge.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPost {
    pub post_id: String,
    pub record: Record,
    pub diagnostics: Vec<Diagnostic>,
}

pub trait PostAdapter: Send + Sync {
    fn store(&self) -> StoreKind;
    /// Hashtag a post must carry to belong to this store.
    fn hashtag(&self) -> &'static str;
    /// Whether records reference the author catalog.
    fn uses_author_catalog(&self) -> bool;

    fn accepts(&self, post: &Post) -> bool {
        grammar::contains_ignore_case(&post.text, self.hashtag())
    }

    fn parse_post(&self, post: &Post) -> ParsedPost;
}

/// Grammar-driven adapter: post metadata around the parsed fields, optionally
/// followed by the author placeholder and category hashtag.
#[derive(Debug, Clone)]
pub struct GrammarAdapter {
    store: StoreKind,
    hashtag: &'static str,
    grammar: Grammar,
    leading: &'static [PostField],
    trailing: &'static [PostField],
    hashtag_refs: bool,
}

impl PostAdapter for GrammarAdapter {
    fn store(&self) -> StoreKind {
        self.store
    }

    fn hashtag(&self) -> &'static str {
        self.hashtag
    }

    fn uses_author_catalog(&self) -> bool {
        self.hashtag_refs
    }

    fn parse_post(&self, post: &Post) -> ParsedPost {
        let Parsed {
            record: fields,
            diagnostics,
        } = grammar::parse(&post.text, &self.grammar);

        let mut record = Record::new();
        for field in self.leading {
            record.insert(field.key().to_string(), field.value(post));
        }
        record.extend(fields);
        for field in self.trailing {
            record.insert(field.key().to_string(), field.value(post));
        }

        if self.hashtag_refs {
            if let Some(author_id) = grammar::author_hashtag(&post.text) {
                record.insert(enrich::AUTHOR_ID_FIELD.to_string(), Value::String(author_id));
            }
            if let Some(category) = grammar::category_hashtag(&post.text) {
                record.insert("category".to_string(), Value::String(category));
            }
        }

        ParsedPost {
            post_id: post.id.clone(),
            record,
            diagnostics,
        }
    }
}

/// Resolve the hashtag author placeholder; unknown ids leave no trace.
pub fn enrich_post(mut parsed: ParsedPost, authors: &dyn Catalog) -> ParsedPost {
    parsed.record = resolve_author(parsed.record, authors, Unresolved::Drop);
    parsed
}

static COMPANY: [SubLabel; 1] = [sub("name", "Company:")];
static LOCATION: [SubLabel; 3] = [
    sub("type", "Type:"),
    sub("address", "Address:"),
    sub("city", "City:"),
];
static APPLY: [SubLabel; 2] = [sub("email", "Email:"), sub("contact_person", "Contact:")];

pub fn recruitment_grammar() -> Grammar {
    Grammar::new(
        "recruitment",
        vec![
            FieldSpec::group("company", &COMPANY),
            FieldSpec::line("title", "Position:").required(),
            FieldSpec::line("description", "Description:"),
            FieldSpec::line("level", "Level:"),
            FieldSpec::compound("location", "Location:", "Salary:", &LOCATION),
            FieldSpec::line("salary", "Salary:"),
            FieldSpec::line("work_time", "Work Time:"),
            FieldSpec::block("requirements", "Requirements:", "Benefits:"),
            FieldSpec::block("benefits", "Benefits:", "Deadline:"),
            FieldSpec::line("apply_deadline", "Deadline:"),
            FieldSpec::group("apply", &APPLY),
            FieldSpec::block("tags", "Tags:", "Apply:"),
        ],
    )
}

pub fn event_grammar() -> Grammar {
    Grammar::new(
        "event",
        vec![
            FieldSpec::line("title", "Title:").required(),
            FieldSpec::line("date", "Date:"),
            FieldSpec::line("location", "Location:"),
            FieldSpec::list("categories", "Categories:", &[',', '|']),
            FieldSpec::line("members", "Members:"),
            FieldSpec::line("logo", "Logo:"),
            FieldSpec::line("background", "Background:").with_default(EVENT_BACKGROUND_DEFAULT),
            FieldSpec::line("url", "URL:"),
            FieldSpec::line("description", "Description:"),
        ],
    )
}

pub fn facebook_post_grammar() -> Grammar {
    Grammar::new(
        "facebook_post",
        vec![
            FieldSpec::line("title", "Title:"),
            FieldSpec::trailing("description", "Description:"),
        ],
    )
    .with_title_fallback("title")
}

pub fn news_grammar() -> Grammar {
    Grammar::new("news", Vec::new())
}

pub fn recruitment_adapter() -> GrammarAdapter {
    GrammarAdapter {
        store: StoreKind::Recruitments,
        hashtag: "#recruitment",
        grammar: recruitment_grammar(),
        leading: &[PostField::Id, PostField::CreatedTime, PostField::ImageUrl],
        trailing: &[],
        hashtag_refs: false,
    }
}

pub fn event_adapter() -> GrammarAdapter {
    GrammarAdapter {
        store: StoreKind::Events,
        hashtag: "#events",
        grammar: event_grammar(),
        leading: &[],
        trailing: &[],
        hashtag_refs: false,
    }
}

pub fn facebook_post_adapter() -> GrammarAdapter {
    GrammarAdapter {
        store: StoreKind::FacebookPosts,
        hashtag: "#posts",
        grammar: facebook_post_grammar(),
        leading: &[PostField::Id],
        trailing: &[PostField::CreatedTime, PostField::Permalink, PostField::ImageUrl],
        hashtag_refs: true,
    }
}

pub fn news_adapter() -> GrammarAdapter {
    GrammarAdapter {
        store: StoreKind::News,
        hashtag: "#news",
        grammar: news_grammar(),
        leading: &[
            PostField::Id,
            PostField::Message,
            PostField::CreatedTime,
            PostField::Permalink,
            PostField::ImageUrl,
        ],
        trailing: &[],
        hashtag_refs: true,
    }
}

/// Adapter for an ingest store; rebuild stores have none.
pub fn adapter_for_store(store: StoreKind) -> Option<Box<dyn PostAdapter>> {
    match store {
        StoreKind::Recruitments => Some(Box::new(recruitment_adapter())),
        StoreKind::Events => Some(Box::new(event_adapter())),
        StoreKind::FacebookPosts => Some(Box::new(facebook_post_adapter())),
        StoreKind::News => Some(Box::new(news_adapter())),
        StoreKind::Blogs | StoreKind::Companies | StoreKind::Authors => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(id: &str, text: &str) -> Post {
        Post {
            id: id.to_string(),
            text: text.to_string(),
            created_time: "2025-08-01T10:00:00+0000".to_string(),
            permalink: Some(format!("https://facebook.test/{id}")),
            image_url: None,
        }
    }

    fn jane_catalog() -> EntityCatalog {
        EntityCatalog::from_json("authors", json!({"A007": {"id": "A007", "name": "Jane"}})).unwrap()
    }

    const BACKEND_JOB: &str = "Title: Backend Engineer\nPosition: Backend Engineer\nLocation:Type: Remote Address: N/A City: HCMC Salary:1200\nSalary: 1200 USD\nRequirements:\n- Go\n- SQL\nBenefits:\n- Insurance\nDeadline: 2025-12-01";

    #[test]
    fn recruitment_example_post() {
        let parsed = recruitment_adapter().parse_post(&post("123", BACKEND_JOB));
        let r = &parsed.record;
        assert_eq!(r["id"], json!("123"));
        assert_eq!(r["title"], json!("Backend Engineer"));
        assert_eq!(
            r["location"],
            json!({"type": "Remote", "address": "N/A", "city": "HCMC"})
        );
        assert_eq!(r["salary"], json!("1200 USD"));
        assert_eq!(r["requirements"], json!(["Go", "SQL"]));
        assert_eq!(r["benefits"], json!(["Insurance"]));
        assert_eq!(r["apply_deadline"], json!("2025-12-01"));
        assert_eq!(r["company"], Value::Null);
        assert_eq!(r["apply"], Value::Null);
        assert_eq!(r["full_picture"], Value::Null);
        // no Tags:/Apply: pair in this post
        assert_eq!(r["tags"], Value::Null);
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn recruitment_record_declares_every_field() {
        let grammar = recruitment_grammar();
        let parsed = recruitment_adapter().parse_post(&post("9", "#recruitment"));
        for spec in &grammar.fields {
            assert!(parsed.record.contains_key(spec.name), "missing {}", spec.name);
        }
        assert_eq!(
            parsed.diagnostics,
            vec![Diagnostic::MissingField {
                field: "title".into()
            }]
        );
    }

    #[test]
    fn recruitment_groups_and_decorated_labels() {
        let text = "\u{1F3E2} Company: Embedded Co\n\u{1F4CC} Position: Firmware Dev\nLocation:\nType: Onsite\nSalary: negotiable\nBenefits:\n\u{2022} 13th month salary\nDeadline: 2025-10-01\nTags:\n- C\n- RTOS\nApply:\nEmail: jobs@embedded.test\nContact: Ms. Lan\n#recruitment";
        let r = recruitment_adapter().parse_post(&post("1", text)).record;
        assert_eq!(r["company"], json!({"name": "Embedded Co"}));
        assert_eq!(r["title"], json!("Firmware Dev"));
        assert_eq!(r["location"], json!({"type": "Onsite", "address": "", "city": ""}));
        assert_eq!(r["benefits"], json!(["13th month salary"]));
        assert_eq!(r["tags"], json!(["C", "RTOS"]));
        assert_eq!(
            r["apply"],
            json!({"email": "jobs@embedded.test", "contact_person": "Ms. Lan"})
        );
    }

    #[test]
    fn benefits_without_deadline_are_absent_and_reported() {
        let text = "Position: QA\nRequirements:\n- Testing\nBenefits:\n- Bonus\n";
        let parsed = recruitment_adapter().parse_post(&post("2", text));
        assert_eq!(parsed.record["requirements"], json!(["Testing"]));
        assert_eq!(parsed.record["benefits"], Value::Null);
        assert_eq!(
            parsed.diagnostics,
            vec![Diagnostic::MalformedBlock {
                field: "benefits".into(),
                terminator: "Deadline:".into()
            }]
        );
    }

    #[test]
    fn event_defaults_and_categories() {
        let text = "#events\nTitle: Embedded Day\nDate: 2025-11-20\nCategories: IoT | Rust, Hardware\nLogo:\nMembers: null\nURL: https://events.test/ed";
        let r = event_adapter().parse_post(&post("5", text)).record;
        assert_eq!(
            Value::Object(r),
            json!({
                "title": "Embedded Day",
                "date": "2025-11-20",
                "location": null,
                "categories": ["IoT", "Rust", "Hardware"],
                "members": null,
                "logo": null,
                "background": EVENT_BACKGROUND_DEFAULT,
                "url": "https://events.test/ed",
                "description": null
            })
        );
    }

    #[test]
    fn event_labels_behind_emoji_are_found() {
        let text = "#events\n\u{1F389} Title: Rust Day\n\u{1F4C5} Date: 2025-11-20";
        let parsed = event_adapter().parse_post(&post("6", text));
        assert_eq!(parsed.record["title"], json!("Rust Day"));
        assert_eq!(parsed.record["date"], json!("2025-11-20"));
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn facebook_post_title_behind_emoji_is_found() {
        let text = "\u{1F4DD} Title: Board notes\n\u{1F4AC} Description: Rev B is up\n#posts";
        let r = facebook_post_adapter().parse_post(&post("79", text)).record;
        assert_eq!(r["title"], json!("Board notes"));
        assert_eq!(r["description"], json!("Rev B is up\n#posts"));
    }

    #[test]
    fn facebook_post_resolves_known_author() {
        let text = "Title: Board bring-up notes\nDescription: Day one\nDay two\n#posts #A007 #CAHardware";
        let adapter = facebook_post_adapter();
        let parsed = enrich_post(adapter.parse_post(&post("77", text)), &jane_catalog());
        let keys: Vec<&str> = parsed.record.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "id",
                "title",
                "description",
                "created_time",
                "permalink_url",
                "full_picture",
                "author",
                "category"
            ]
        );
        assert_eq!(parsed.record["author"], json!({"id": "A007", "name": "Jane"}));
        assert_eq!(parsed.record["category"], json!("Hardware"));
        assert_eq!(
            parsed.record["description"],
            json!("Day one\nDay two\n#posts #A007 #CAHardware")
        );
        assert!(!parsed.record.contains_key("author_id"));
    }

    #[test]
    fn unknown_author_hashtag_leaves_no_author_field() {
        let adapter = facebook_post_adapter();
        let parsed = enrich_post(
            adapter.parse_post(&post("78", "Quick update from the lab\n#posts #Z999")),
            &jane_catalog(),
        );
        assert!(!parsed.record.contains_key("author"));
        assert!(!parsed.record.contains_key("author_id"));
        assert_eq!(parsed.record["title"], json!("Quick update from the lab"));
        assert_eq!(parsed.record["description"], Value::Null);
    }

    #[test]
    fn news_keeps_the_message() {
        let parsed = enrich_post(
            news_adapter().parse_post(&post("n1", "Chip shortage easing #news #a007")),
            &jane_catalog(),
        );
        assert_eq!(parsed.record["message"], json!("Chip shortage easing #news #a007"));
        assert_eq!(parsed.record["author"]["name"], json!("Jane"));
    }

    #[test]
    fn gates_are_case_insensitive_hashtags() {
        assert!(event_adapter().accepts(&post("1", "Join us! #Events")));
        assert!(!event_adapter().accepts(&post("1", "no tag here")));
        assert!(recruitment_adapter().accepts(&post("1", "#RECRUITMENT")));
        assert!(adapter_for_store(StoreKind::Companies).is_none());
        assert_eq!(
            adapter_for_store(StoreKind::News).map(|a| a.store()),
            Some(StoreKind::News)
        );
    }
}
