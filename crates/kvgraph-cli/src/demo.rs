//! Sample object graph for `kvgraph demo`.

use std::sync::Arc;

use kvgraph_backup::InMemoryBackup;
use kvgraph_mapper::{
    ElementKind, Entity, EntityDescriptor, MapperConfig, Member, Record, ScalarType, ScalarValue,
    Session, Tracked, TrackedList, TrackedMap, TrackedSet, TypeResult,
};
use kvgraph_store::{InMemoryStore, Value};
use tracing::info;

const WRITE_COMMANDS: [&str; 7] = ["hset", "hdel", "rpush", "lpush", "lrem", "zadd", "zrem"];

#[derive(Debug, Default)]
pub struct Library {
    pub id: String,
    pub name: String,
    pub books: TrackedList<Tracked<Book>>,
    pub shelves: TrackedMap<String, i64>,
    pub ranking: TrackedSet<Book>,
}

impl Record for Library {
    fn get(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "id" => Some(self.id.clone().into()),
            "name" => Some(self.name.clone().into()),
            _ => None,
        }
    }

    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "name" => self.name = value.try_into()?,
            _ => {}
        }
        Ok(())
    }

    fn members(&mut self) -> Vec<(&'static str, &mut dyn Member)> {
        vec![
            ("books", &mut self.books as &mut dyn Member),
            ("shelves", &mut self.shelves as &mut dyn Member),
            ("ranking", &mut self.ranking as &mut dyn Member),
        ]
    }
}

impl Entity for Library {
    fn describe() -> TypeResult<EntityDescriptor> {
        EntityDescriptor::builder("Library")
            .identifier("id", ScalarType::Text)
            .scalar("name", ScalarType::Text)
            .list("books", ElementKind::Entity("Book"))
            .map("shelves", ScalarType::Text, ElementKind::Scalar(ScalarType::Long))
            .ordered_set("ranking", "Book")
            .no_cascade()
            .build()
    }
}

#[derive(Debug, Default)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub rating: i64,
}

impl Record for Book {
    fn get(&self, field: &str) -> Option<ScalarValue> {
        match field {
            "id" => Some(self.id.clone().into()),
            "title" => Some(self.title.clone().into()),
            "rating" => Some(self.rating.into()),
            _ => None,
        }
    }

    fn put(&mut self, field: &str, value: ScalarValue) -> TypeResult<()> {
        match field {
            "id" => self.id = value.try_into()?,
            "title" => self.title = value.try_into()?,
            "rating" => self.rating = value.try_into()?,
            _ => {}
        }
        Ok(())
    }
}

impl Entity for Book {
    fn describe() -> TypeResult<EntityDescriptor> {
        EntityDescriptor::builder("Book")
            .identifier("id", ScalarType::Text)
            .scalar("title", ScalarType::Text)
            .order_key("rating", ScalarType::Long)
            .build()
    }
}

/// What the demo left in the store.
#[derive(Debug)]
pub struct DemoReport {
    pub library: String,
    pub keys: Vec<(String, Value)>,
    pub writes: u64,
}

/// Create a library with `books` books, rank them, rename the library, and
/// read it back through a fresh session sharing the same store.
pub async fn run(
    books: usize,
    namespace: &str,
    config: MapperConfig,
) -> anyhow::Result<DemoReport> {
    let store = Arc::new(InMemoryStore::new());
    let backup = Arc::new(InMemoryBackup::new(namespace));
    let session = Session::builder(store.clone())
        .backup(backup.clone())
        .config(config.clone())
        .build();

    let shelf: TrackedList<Tracked<Book>> = (1..=books)
        .map(|n| {
            Tracked::new(Book {
                title: format!("Volume {n}"),
                rating: (n as i64 * 7) % 10,
                ..Book::default()
            })
        })
        .collect::<Vec<_>>()
        .into();
    let mut library = session
        .create(Library {
            name: "Branch".into(),
            books: shelf,
            ..Library::default()
        })
        .await?;
    let key = library
        .key()
        .map(|k| k.formatted())
        .unwrap_or_default();
    info!(key = %key, books, "library created");

    let ids: Vec<String> = library
        .get()
        .await?
        .books
        .peek()
        .iter()
        .filter_map(|b| b.id().map(str::to_string))
        .collect();
    let loaded = library.get_mut().await?;
    for id in &ids {
        loaded.ranking.insert(session.reference::<Book>(id)?).await?;
    }
    loaded.shelves.insert("fiction".into(), books as i64).await?;
    library.set_field("name", "Central Branch").await?;

    // A second session reads the graph back through the same store.
    let reader = Session::builder(store.clone())
        .backup(backup)
        .config(config)
        .build();
    let mut copy = reader.retrieve::<Library>(library.id().unwrap_or_default()).await?;
    let name = copy.object.get().await?.name.clone();
    info!(key = %key, name = %name, "library read back");

    let keys = store
        .keys()
        .into_iter()
        .filter_map(|k| store.value(&k).map(|v| (k, v)))
        .collect();
    let writes = WRITE_COMMANDS.iter().map(|c| store.command_count(c)).sum();
    Ok(DemoReport {
        library: format!("{key} ({name})"),
        keys,
        writes,
    })
}
