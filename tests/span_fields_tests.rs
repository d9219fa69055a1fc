use changeset_persister::{
    ChangeSet, ChangeSetPersister, EntityMetadata, EntityRecord, InMemoryDriver,
    MetadataRegistry, PersistContext, PropertyDescriptor, TableDefinition, TransactionContext,
};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Metadata, Subscriber};

/// Collects the fields of every span opened while it is the default
/// subscriber.
#[derive(Clone, Default)]
struct SpanFields {
    fields: Arc<Mutex<Vec<(String, String)>>>,
}

impl SpanFields {
    fn get(&self, name: &str) -> Option<String> {
        self.fields
            .lock()
            .unwrap()
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.clone())
    }
}

struct Collect<'a>(&'a mut Vec<(String, String)>);

impl Visit for Collect<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl Subscriber for SpanFields {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, span: &Attributes<'_>) -> Id {
        let mut fields = self.fields.lock().unwrap();
        span.record(&mut Collect(&mut fields));
        Id::from_u64(1)
    }

    fn record(&self, _span: &Id, _values: &Record<'_>) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, _event: &Event<'_>) {}

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

#[tokio::test]
async fn persist_span_carries_transaction_label() {
    let recorder = SpanFields::default();
    let _guard = tracing::subscriber::set_default(recorder.clone());

    let driver = Arc::new(InMemoryDriver::new());
    driver
        .create_table(TableDefinition::new("tag", &["id"]).auto_increment("id"))
        .await
        .unwrap();
    let metadata = MetadataRegistry::new().with(
        EntityMetadata::builder("tag")
            .property(PropertyDescriptor::new("id").primary())
            .property(PropertyDescriptor::new("label"))
            .build()
            .unwrap(),
    );
    let persister = ChangeSetPersister::new(Arc::new(metadata), driver);
    let tx = TransactionContext::new().labeled("nightly-import");
    let ctx = PersistContext::new().with_transaction(tx.clone());

    let mut cs = ChangeSet::create("tag", EntityRecord::new()).with("label", "rust");
    persister.persist(&mut cs, &ctx).await.unwrap();

    assert_eq!(recorder.get("entity").as_deref(), Some("tag"));
    assert_eq!(recorder.get("kind").as_deref(), Some("create"));
    assert_eq!(recorder.get("tx_label").as_deref(), Some("nightly-import"));
    assert_eq!(recorder.get("tx"), Some(tx.id().as_u64().to_string()));
}
