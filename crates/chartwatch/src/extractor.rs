//! Snapshot extraction: rendered chart page → ordered `AppRecord`s.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::fields::{FieldMapping, FieldSpec, ReadMode, Selectors};
use crate::page::{ElementHandle, PageContentProvider};
use crate::types::{
    AppRecord, DroppedItem, Field, FieldError, Snapshot, TrackerError, TrackerResult,
};

/// Applies a [`FieldMapping`] to every item container on the page.
#[derive(Debug, Clone)]
pub struct SnapshotExtractor {
    mapping: FieldMapping,
}

impl SnapshotExtractor {
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    pub fn from_selectors(selectors: &Selectors) -> Self {
        Self::new(FieldMapping::from_selectors(selectors))
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Extract one record per item container, in page order.
    ///
    /// Items with a missing or malformed field are logged and dropped. Zero
    /// matching containers is fatal, since it means the selectors are stale.
    pub async fn extract<P>(&self, page: &mut P) -> TrackerResult<Snapshot>
    where
        P: PageContentProvider + ?Sized,
    {
        let items = page.find_all(&self.mapping.item_selector).await?;
        if items.is_empty() {
            return Err(TrackerError::FatalExtraction {
                selector: self.mapping.item_selector.clone(),
            });
        }

        let mut snapshot = Snapshot::default();
        let mut seen_ids = HashSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let outcome = match self.extract_item(page, item).await {
                Ok(record) if !seen_ids.insert(record.id.clone()) => Err(FieldError::new(
                    Field::Id,
                    format!("duplicate id {:?} in snapshot", record.id),
                )),
                Ok(record) => Ok(record),
                Err(TrackerError::Extraction(error)) => Err(error),
                Err(fatal) => return Err(fatal),
            };

            match outcome {
                Ok(record) => snapshot.records.push(record),
                Err(error) => {
                    warn!(
                        index,
                        field = %error.field,
                        reason = %error.reason,
                        "dropping chart item"
                    );
                    snapshot.dropped.push(DroppedItem { index, error });
                }
            }
        }

        info!(
            "Extracted {} records ({} dropped)",
            snapshot.records.len(),
            snapshot.dropped.len()
        );
        Ok(snapshot)
    }

    async fn extract_item<P>(&self, page: &mut P, item: ElementHandle) -> TrackerResult<AppRecord>
    where
        P: PageContentProvider + ?Sized,
    {
        let mut builder = RecordBuilder::default();
        for spec in &self.mapping.fields {
            let raw = read_field(page, item, spec).await?;
            let value =
                (spec.transform)(&raw).map_err(|reason| FieldError::new(spec.field, reason))?;
            debug!(field = %spec.field, value = %value, "read field");
            builder.set(spec.field, value);
        }
        Ok(builder.finish()?)
    }
}

async fn read_field<P>(page: &mut P, item: ElementHandle, spec: &FieldSpec) -> TrackerResult<String>
where
    P: PageContentProvider + ?Sized,
{
    let mut element = item;
    for selector in &spec.path {
        element = page.find_within(element, selector).await?.ok_or_else(|| {
            FieldError::new(spec.field, format!("no element matches {selector:?}"))
        })?;
    }

    let raw = match &spec.read {
        ReadMode::InnerHtml => page.inner_html(element).await?,
        ReadMode::Text => page.text(element).await?,
        ReadMode::Attribute(name) => page
            .attribute(element, name)
            .await?
            .ok_or_else(|| FieldError::new(spec.field, format!("missing `{name}` attribute")))?,
    };
    Ok(raw)
}

#[derive(Default)]
struct RecordBuilder {
    id: Option<String>,
    name: Option<String>,
    url: Option<String>,
    image_url: Option<String>,
    price: Option<String>,
}

impl RecordBuilder {
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Id => &mut self.id,
            Field::Name => &mut self.name,
            Field::Url => &mut self.url,
            Field::ImageUrl => &mut self.image_url,
            Field::Price => &mut self.price,
        };
        *slot = Some(value);
    }

    fn finish(self) -> Result<AppRecord, FieldError> {
        let missing = |field: Field| FieldError::new(field, "not mapped");
        Ok(AppRecord {
            id: self.id.ok_or_else(|| missing(Field::Id))?,
            name: self.name.ok_or_else(|| missing(Field::Name))?,
            url: self.url.ok_or_else(|| missing(Field::Url))?,
            image_url: self.image_url.ok_or_else(|| missing(Field::ImageUrl))?,
            price: self.price.ok_or_else(|| missing(Field::Price))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{storefront_item, FakeElement, FakePage};

    const DETAILS: &str = "https://play.google.com/store/apps/details?id=";

    fn item(id: &str, name: &str, price: &str) -> FakeElement {
        storefront_item(
            &Selectors::default(),
            name,
            &format!("{DETAILS}{id}"),
            price,
            &format!("https://play-lh.googleusercontent.com/{id}=s64"),
        )
    }

    #[tokio::test]
    async fn test_extracts_records_in_page_order() {
        let mut page = FakePage::new(vec![
            item("com.a", "Alpha", "$0.99"),
            item("com.b", "Beta &amp; Co", "$12.50"),
            item("com.c", "Gamma", "Free"),
        ]);

        let snapshot = SnapshotExtractor::from_selectors(&Selectors::default())
            .extract(&mut page)
            .await
            .unwrap();

        let ids: Vec<&str> = snapshot.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["com.a", "com.b", "com.c"]);
        assert!(snapshot.dropped.is_empty());

        let beta = &snapshot.records[1];
        assert_eq!(beta.name, "Beta & Co");
        assert_eq!(beta.price, "12.50");
        assert_eq!(beta.url, format!("{DETAILS}com.b"));
        assert_eq!(beta.image_url, "https://play-lh.googleusercontent.com/com.b=s64");
        assert_eq!(snapshot.records[2].price, "0");
    }

    #[tokio::test]
    async fn test_malformed_url_drops_only_that_item() {
        let selectors = Selectors::default();
        let mut page = FakePage::new(vec![
            item("com.a", "Alpha", "$1.99"),
            storefront_item(
                &selectors,
                "Broken",
                "https://play.google.com/store/apps/details",
                "$2.99",
                "https://img/broken",
            ),
            item("com.c", "Gamma", "$3.99"),
        ]);

        let snapshot = SnapshotExtractor::from_selectors(&selectors)
            .extract(&mut page)
            .await
            .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.dropped.len(), 1);
        assert_eq!(snapshot.dropped[0].index, 1);
        assert_eq!(snapshot.dropped[0].error.field, Field::Id);
    }

    #[tokio::test]
    async fn test_unparseable_price_is_a_field_error() {
        let mut page = FakePage::new(vec![
            item("com.a", "Alpha", "Install"),
            item("com.b", "Beta", "4.99"),
        ]);

        let snapshot = SnapshotExtractor::from_selectors(&Selectors::default())
            .extract(&mut page)
            .await
            .unwrap();

        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].price, "4.99");
        assert_eq!(snapshot.dropped[0].error.field, Field::Price);
    }

    #[tokio::test]
    async fn test_missing_name_element_is_a_field_error() {
        let selectors = Selectors::default();
        let nameless = FakeElement::new(&selectors.item)
            .child(FakeElement::new(&selectors.url).attr("href", &format!("{DETAILS}com.x")));
        let mut page = FakePage::new(vec![nameless, item("com.b", "Beta", "$1.00")]);

        let snapshot = SnapshotExtractor::from_selectors(&selectors)
            .extract(&mut page)
            .await
            .unwrap();

        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.dropped[0].error.field, Field::Name);
    }

    #[tokio::test]
    async fn test_duplicate_id_keeps_first_occurrence() {
        let mut page = FakePage::new(vec![
            item("com.a", "First", "$1.00"),
            item("com.a", "Second", "$2.00"),
        ]);

        let snapshot = SnapshotExtractor::from_selectors(&Selectors::default())
            .extract(&mut page)
            .await
            .unwrap();

        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].name, "First");
        assert_eq!(snapshot.dropped[0].error.field, Field::Id);
    }

    #[tokio::test]
    async fn test_no_items_is_fatal() {
        let mut page = FakePage::new(vec![FakeElement::new(".unrelated")]);

        let err = SnapshotExtractor::from_selectors(&Selectors::default())
            .extract(&mut page)
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, TrackerError::FatalExtraction { .. }));
    }

    #[tokio::test]
    async fn test_extraction_is_repeatable() {
        let mut page = FakePage::new(vec![item("com.a", "Alpha", "$1.00")]);
        let extractor = SnapshotExtractor::from_selectors(&Selectors::default());

        let first = extractor.extract(&mut page).await.unwrap();
        let second = extractor.extract(&mut page).await.unwrap();
        assert_eq!(first.records, second.records);
    }
}
