use std::{collections::HashMap, path::Path};

use tantivy::{
    DocAddress,
    Index,
    IndexReader,
    IndexWriter,
    ReloadPolicy,
    Searcher,
    TantivyDocument,
    collector::{Count, DocSetCollector, TopDocs},
    query::{AllQuery, Query},
    schema::{
        Field,
        INDEXED,
        IndexRecordOption,
        STORED,
        STRING,
        Schema,
        TextFieldIndexing,
        TextOptions,
        Value,
    },
    tokenizer::{
        LowerCaser,
        RegexTokenizer,
        RemoveLongFilter,
        TextAnalyzer,
        TokenStream,
    },
};
use tracing::{debug, warn};

use crate::{
    corpus::Document,
    error::{Error, Result},
    text_util::WORD_TOKEN_PATTERN,
};

/// Name of the analyzer used for document bodies.
pub const BODY_TOKENIZER: &str = "genizah";

/// Tokens longer than this many bytes are not indexed.
pub const MAX_TOKEN_BYTES: usize = 100;

/// Field names used in the schema.
pub mod fields {
    pub const DOC_ID: &str = "doc_id";
    pub const SYSTEM_ID: &str = "system_id";
    pub const ORDINAL: &str = "ordinal";
    pub const PAGE_NO: &str = "page_no";
    pub const HEADER: &str = "header";
    pub const BODY: &str = "body";
}

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub doc_id: Field,
    pub system_id: Field,
    pub ordinal: Field,
    pub page_no: Field,
    pub header: Field,
    pub body: Field,
}

impl SchemaFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        let f = |name: &str| {
            schema.get_field(name).map_err(|_| {
                Error::IndexUnavailable(format!(
                    "index schema has no '{name}' field"
                ))
            })
        };
        Ok(Self {
            doc_id: f(fields::DOC_ID)?,
            system_id: f(fields::SYSTEM_ID)?,
            ordinal: f(fields::ORDINAL)?,
            page_no: f(fields::PAGE_NO)?,
            header: f(fields::HEADER)?,
            body: f(fields::BODY)?,
        })
    }
}

fn build_schema() -> (Schema, SchemaFields) {
    let mut builder = Schema::builder();

    let doc_id = builder.add_text_field(fields::DOC_ID, STRING | STORED);
    let system_id = builder.add_text_field(fields::SYSTEM_ID, STRING | STORED);
    let ordinal = builder.add_u64_field(fields::ORDINAL, INDEXED | STORED);
    let page_no = builder.add_u64_field(fields::PAGE_NO, STORED);
    let header = builder.add_text_field(fields::HEADER, STORED);

    let body_opts = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(BODY_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored();
    let body = builder.add_text_field(fields::BODY, body_opts);

    let schema = builder.build();
    let fields = SchemaFields {
        doc_id,
        system_id,
        ordinal,
        page_no,
        header,
        body,
    };

    (schema, fields)
}

fn register_tokenizers(index: &Index) -> Result<()> {
    let analyzer = TextAnalyzer::builder(RegexTokenizer::new(
        WORD_TOKEN_PATTERN,
    )?)
    .filter(RemoveLongFilter::limit(MAX_TOKEN_BYTES))
    .filter(LowerCaser)
    .build();
    index.tokenizers().register(BODY_TOKENIZER, analyzer);
    Ok(())
}

/// Stored documents, loaded once when the index is opened.
///
/// The index analyses bodies for retrieval, so verification and snippet
/// rendering work from this table instead.
#[derive(Debug, Default)]
pub struct DocumentTable {
    documents: Vec<Document>,
    by_address: HashMap<DocAddress, usize>,
    by_id: HashMap<String, usize>,
    by_system: HashMap<String, Vec<usize>>,
    corrupt: usize,
}

impl DocumentTable {
    fn load(searcher: &Searcher, f: &SchemaFields) -> Result<Self> {
        let addresses = searcher.search(&AllQuery, &DocSetCollector)?;

        let mut rows: Vec<(u64, DocAddress, Document)> =
            Vec::with_capacity(addresses.len());
        let mut corrupt = 0;
        for address in addresses {
            let stored: TantivyDocument = match searcher.doc(address) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(?address, error = %e, "Unreadable stored document");
                    corrupt += 1;
                    continue;
                }
            };
            match read_document(&stored, f) {
                Some((ordinal, doc)) => rows.push((ordinal, address, doc)),
                None => {
                    warn!(?address, "Stored document is missing fields");
                    corrupt += 1;
                }
            }
        }
        rows.sort_by_key(|(ordinal, _, _)| *ordinal);

        let mut table = Self {
            corrupt,
            ..Self::default()
        };
        for (slot, (_, address, doc)) in rows.into_iter().enumerate() {
            table.by_address.insert(address, slot);
            table.by_id.entry(doc.id.clone()).or_insert(slot);
            table
                .by_system
                .entry(doc.system_id.clone())
                .or_default()
                .push(slot);
            table.documents.push(doc);
        }

        let docs = &table.documents;
        for slots in table.by_system.values_mut() {
            slots.sort_by_key(|&s| (docs[s].page_no.unwrap_or(u32::MAX), s));
        }

        debug!(
            documents = table.documents.len(),
            corrupt = table.corrupt,
            "Loaded document table"
        );
        Ok(table)
    }

    /// Document at `slot` (load order).
    pub fn get(&self, slot: usize) -> Option<&Document> {
        self.documents.get(slot)
    }

    pub fn slot_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.slot_of(id).map(|s| &self.documents[s])
    }

    /// Slots of every page of a manuscript, ordered by page number.
    pub fn page_slots(&self, system_id: &str) -> &[usize] {
        self.by_system
            .get(system_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Stored documents that could not be read back.
    pub fn corrupt(&self) -> usize {
        self.corrupt
    }

    fn slot_at(&self, address: DocAddress) -> Option<usize> {
        self.by_address.get(&address).copied()
    }
}

fn read_document(
    doc: &TantivyDocument,
    f: &SchemaFields,
) -> Option<(u64, Document)> {
    let text = |field| {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    let ordinal = doc.get_first(f.ordinal).and_then(|v| v.as_u64())?;
    let page_no = doc
        .get_first(f.page_no)
        .and_then(|v| v.as_u64())
        .and_then(|p| u32::try_from(p).ok());

    Some((
        ordinal,
        Document {
            id: text(f.doc_id)?,
            system_id: text(f.system_id)?,
            page_no,
            header: text(f.header).unwrap_or_default(),
            body: text(f.body)?,
        },
    ))
}

/// Documents matched by a retrieval query.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    /// Number of matching documents in the index, before any cap.
    pub total: usize,
    /// Table slots of the retrieved documents, ordered by slot.
    pub slots: Vec<usize>,
}

impl Candidates {
    pub fn is_truncated(&self) -> bool {
        self.total > self.slots.len()
    }
}

/// Writes documents into a freshly created index.
pub struct IndexBuilder {
    writer: IndexWriter,
    fields: SchemaFields,
}

impl IndexBuilder {
    /// Memory budget handed to the tantivy writer.
    pub const MEMORY_BUDGET: usize = 50_000_000;

    pub fn add(&self, ordinal: u64, doc: &Document) -> Result<()> {
        let f = &self.fields;
        let mut stored = TantivyDocument::default();
        stored.add_text(f.doc_id, &doc.id);
        stored.add_text(f.system_id, &doc.system_id);
        stored.add_u64(f.ordinal, ordinal);
        if let Some(page) = doc.page_no {
            stored.add_u64(f.page_no, u64::from(page));
        }
        stored.add_text(f.header, &doc.header);
        stored.add_text(f.body, &doc.body);
        self.writer.add_document(stored)?;
        Ok(())
    }

    /// Commit everything added so far and wait for background merges.
    pub fn finish(mut self) -> Result<()> {
        self.writer.commit()?;
        self.writer.wait_merging_threads()?;
        Ok(())
    }
}

/// Read-only handle over a built index and its document table.
pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    searcher: Searcher,
    fields: SchemaFields,
    table: DocumentTable,
}

impl SearchIndex {
    /// Create an empty index in `dir`, which must not already hold one.
    pub fn create(dir: &Path) -> Result<IndexBuilder> {
        std::fs::create_dir_all(dir)?;
        let (schema, fields) = build_schema();
        let index = Index::create_in_dir(dir, schema)?;
        register_tokenizers(&index)?;
        let writer = index.writer(IndexBuilder::MEMORY_BUDGET)?;
        Ok(IndexBuilder { writer, fields })
    }

    /// Open a previously built index read-only.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::IndexUnavailable(format!(
                "no index at {}",
                dir.display()
            )));
        }
        let unavailable =
            |e: tantivy::TantivyError| Error::IndexUnavailable(e.to_string());

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| Error::IndexUnavailable(e.to_string()))?;
        if !Index::exists(&mmap_dir)
            .map_err(|e| Error::IndexUnavailable(e.to_string()))?
        {
            return Err(Error::IndexUnavailable(format!(
                "no index at {}",
                dir.display()
            )));
        }
        let index = Index::open(mmap_dir).map_err(unavailable)?;
        Self::from_index(index)
    }

    /// Build an in-memory index over `documents`.
    pub fn build_in_ram(documents: &[Document]) -> Result<Self> {
        let (schema, fields) = build_schema();
        let index = Index::create_in_ram(schema);
        register_tokenizers(&index)?;

        let builder = IndexBuilder {
            writer: index.writer(15_000_000)?,
            fields,
        };
        for (ordinal, doc) in documents.iter().enumerate() {
            builder.add(ordinal as u64, doc)?;
        }
        builder.finish()?;

        Self::from_index(index)
    }

    fn from_index(index: Index) -> Result<Self> {
        let fields = SchemaFields::resolve(&index.schema())?;
        register_tokenizers(&index)?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let searcher = reader.searcher();
        let table = DocumentTable::load(&searcher, &fields)?;
        Ok(Self {
            index,
            reader,
            searcher,
            fields,
            table,
        })
    }

    pub fn fields(&self) -> SchemaFields {
        self.fields
    }

    pub fn table(&self) -> &DocumentTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.table.document(id)
    }

    /// Every page of a manuscript, ordered by page number.
    pub fn pages(&self, system_id: &str) -> Vec<&Document> {
        self.table
            .page_slots(system_id)
            .iter()
            .filter_map(|&s| self.table.get(s))
            .collect()
    }

    /// Run a retrieval query, keeping at most `limit` documents.
    pub fn candidates(
        &self,
        query: &dyn Query,
        limit: usize,
    ) -> Result<Candidates> {
        let (total, top) = self
            .searcher
            .search(query, &(Count, TopDocs::with_limit(limit.max(1))))?;

        let mut slots: Vec<usize> = top
            .into_iter()
            .filter_map(|(_, address)| self.table.slot_at(address))
            .collect();
        slots.sort_unstable();

        Ok(Candidates { total, slots })
    }

    /// Number of documents a query matches.
    pub fn count(&self, query: &dyn Query) -> Result<usize> {
        Ok(self.searcher.search(query, &Count)?)
    }

    /// Analyse `text` with the body tokenizer, as the index would.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        let Some(mut analyzer) = self.index.tokenizers().get(BODY_TOKENIZER)
        else {
            return Vec::new();
        };
        let mut stream = analyzer.token_stream(text);
        let mut out = Vec::new();
        while stream.advance() {
            out.push(stream.token().text.clone());
        }
        out
    }

    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndex")
            .field("documents", &self.table.len())
            .finish_non_exhaustive()
    }
}
