#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use include_by_default::{
    AssociationMetadata, DefaultIncludeFinder, DefaultIncludeRegistry, EntityMetadata,
    FindError, FindOptions, Finder, IncludeByDefaultConfig, QueryContext, Record,
    SchemaRegistry, SeaOrmFinder,
};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Blog schema: posts with an author, two many-to-many associations sharing
/// the `posts_comments` join table, and tags reached through taggings.
pub fn blog_schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .register(
            EntityMetadata::new("Post", "posts")
                .columns(["id", "title", "author_id"])
                .association(AssociationMetadata::belongs_to("author", "Author"))
                .association(
                    AssociationMetadata::has_and_belongs_to_many("comments", "Comment")
                        .join_table("posts_comments"),
                )
                .association(
                    AssociationMetadata::has_and_belongs_to_many("featured_comments", "Comment")
                        .join_table("posts_comments"),
                )
                .association(AssociationMetadata::has_many("taggings", "Tagging"))
                .association(AssociationMetadata::has_many_through("tags", "taggings"))
                .association(AssociationMetadata::has_many_through("keywords", "taggings")),
        )
        .register(
            EntityMetadata::new("Author", "authors")
                .columns(["id", "name"])
                .association(AssociationMetadata::has_many("posts", "Post")),
        )
        .register(EntityMetadata::new("Comment", "comments").columns(["id", "body"]))
        .register(
            EntityMetadata::new("Tagging", "taggings")
                .columns(["id", "post_id", "tag_id"])
                .association(AssociationMetadata::belongs_to("post", "Post"))
                .association(AssociationMetadata::belongs_to("tag", "Tag")),
        )
        .register(EntityMetadata::new("Tag", "tags").columns(["id", "name"]))
}

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();

    let statements = [
        "CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, title TEXT NOT NULL, author_id INTEGER)",
        "CREATE TABLE comments (id INTEGER PRIMARY KEY, body TEXT NOT NULL)",
        "CREATE TABLE posts_comments (post_id INTEGER NOT NULL, comment_id INTEGER NOT NULL)",
        "CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        "CREATE TABLE taggings (id INTEGER PRIMARY KEY, post_id INTEGER NOT NULL, tag_id INTEGER NOT NULL)",
        "INSERT INTO authors (id, name) VALUES (1, 'ann')",
        "INSERT INTO posts (id, title, author_id) VALUES (1, 'first', 1), (2, 'second', 1), (3, 'third', NULL)",
        "INSERT INTO comments (id, body) VALUES (1, 'nice'), (2, 'meh'), (3, 'late')",
        "INSERT INTO posts_comments (post_id, comment_id) VALUES (1, 1), (1, 2), (2, 3)",
        "INSERT INTO tags (id, name) VALUES (1, 'rust'), (2, 'sql')",
        "INSERT INTO taggings (id, post_id, tag_id) VALUES (1, 1, 1), (2, 1, 2), (3, 2, 2)",
    ];
    for sql in statements {
        db.execute_unprepared(sql).await.unwrap();
    }
    db
}

pub fn decorate<F: Finder>(
    inner: F,
    schema: Arc<SchemaRegistry>,
    defaults: DefaultIncludeRegistry,
) -> DefaultIncludeFinder<F> {
    DefaultIncludeFinder::new(
        inner,
        schema,
        Arc::new(defaults),
        Arc::new(IncludeByDefaultConfig::default()),
    )
}

pub async fn blog_finder(
    defaults: DefaultIncludeRegistry,
) -> DefaultIncludeFinder<SeaOrmFinder<DatabaseConnection>> {
    blog_finder_with_config(defaults, IncludeByDefaultConfig::default()).await
}

/// SQLite-backed finder whose decorator and inner finder share one config
pub async fn blog_finder_with_config(
    defaults: DefaultIncludeRegistry,
    config: IncludeByDefaultConfig,
) -> DefaultIncludeFinder<SeaOrmFinder<DatabaseConnection>> {
    let schema = Arc::new(blog_schema());
    let config = Arc::new(config);
    let db = setup_test_db().await;
    DefaultIncludeFinder::new(
        SeaOrmFinder::new(db, schema.clone(), config.clone()),
        schema,
        Arc::new(defaults),
        config,
    )
}

/// Values of `column` over a list of records, sorted
pub fn sorted_column(records: &[Record], column: &str) -> Vec<String> {
    let mut values: Vec<String> = records
        .iter()
        .filter_map(|r| r.get(column))
        .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
        .collect();
    values.sort();
    values
}

pub fn id_of(record: &Record) -> Option<i64> {
    record.get("id").and_then(|v| v.as_i64())
}

/// Finder that replays canned results and remembers what it was asked
#[derive(Default)]
pub struct ScriptedFinder {
    responses: Mutex<VecDeque<Result<Vec<Record>, FindError>>>,
    calls: Mutex<Vec<FindOptions>>,
}

impl ScriptedFinder {
    pub fn new(responses: Vec<Result<Vec<Record>, FindError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<FindOptions> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Finder for ScriptedFinder {
    async fn find_every(
        &self,
        _entity: &str,
        options: &FindOptions,
        context: &mut QueryContext,
    ) -> Result<Vec<Record>, FindError> {
        self.calls.lock().unwrap().push(options.clone());
        context.record_statement(options.joins.clone().unwrap_or_default());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
