//! Static registry of the CRUD resources exposed under `/api/:resource`.
//!
//! Each entry ties a URL name to its table, writable columns and parent link.
//! The generic handlers, the record parser and the repository all read from
//! here, so adding a table to `sql/schema.sql` plus one entry below is enough
//! to expose it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Number,
    Boolean,
    Uuid,
    Date,
    Timestamp,
    TextArray,
    /// Text restricted to a fixed set of values
    Choice(&'static [&'static str]),
}

impl ColumnKind {
    /// Postgres type used when casting filter placeholders
    pub fn pg_type(&self) -> &'static str {
        match self {
            ColumnKind::Text | ColumnKind::Choice(_) => "text",
            ColumnKind::Integer => "integer",
            ColumnKind::Number => "numeric",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Uuid => "uuid",
            ColumnKind::Date => "date",
            ColumnKind::Timestamp => "timestamptz",
            ColumnKind::TextArray => "text[]",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ColumnKind::Text => "a string".to_string(),
            ColumnKind::Integer => "an integer".to_string(),
            ColumnKind::Number => "a number".to_string(),
            ColumnKind::Boolean => "a boolean".to_string(),
            ColumnKind::Uuid => "a UUID".to_string(),
            ColumnKind::Date => "a date (YYYY-MM-DD)".to_string(),
            ColumnKind::Timestamp => "an RFC 3339 timestamp".to_string(),
            ColumnKind::TextArray => "an array of strings".to_string(),
            ColumnKind::Choice(values) => format!("one of {}", values.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
}

const fn req(name: &'static str, kind: ColumnKind) -> ColumnDef {
    ColumnDef { name, kind, required: true }
}

const fn opt(name: &'static str, kind: ColumnKind) -> ColumnDef {
    ColumnDef { name, kind, required: false }
}

/// Foreign key to the owning resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    pub column: &'static str,
    pub resource: &'static str,
}

#[derive(Debug)]
pub struct ResourceDef {
    pub name: &'static str,
    pub table: &'static str,
    /// Writable columns. `id`, `created_at` and `updated_at` are managed by the database.
    pub columns: &'static [ColumnDef],
    /// Columns matched by `?search=`
    pub search: &'static [&'static str],
    pub order: &'static str,
    pub parent: Option<ParentRef>,
    /// Column filled with the acting user's id on create when absent
    pub author_column: Option<&'static str>,
}

impl ResourceDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Every column a filter may reference, with the cast used for its placeholders
    pub fn filterable(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        [("id", "uuid"), ("created_at", "timestamptz"), ("updated_at", "timestamptz")]
            .into_iter()
            .chain(self.columns.iter().map(|c| (c.name, c.kind.pg_type())))
    }

    pub fn is_filterable(&self, name: &str) -> bool {
        self.filterable().any(|(col, _)| col == name)
    }

    /// Resources whose parent is this one
    pub fn children(&self) -> impl Iterator<Item = &'static ResourceDef> + '_ {
        RESOURCES
            .iter()
            .filter(move |r| r.parent.map(|p| p.resource == self.name).unwrap_or(false))
    }
}

use ColumnKind::*;

const KNOWLEDGE_STATUS: &[&str] = &["DRAFT", "PUBLISHED", "ARCHIVED"];
const AGENT_STATUS: &[&str] = &["ACTIVE", "INACTIVE"];

pub static RESOURCES: &[ResourceDef] = &[
    // Product catalog
    ResourceDef {
        name: "brands",
        table: "brands",
        columns: &[req("name", Text), opt("image_url", Text), opt("description", Text)],
        search: &["name", "description"],
        order: "name asc",
        parent: None,
        author_column: None,
    },
    ResourceDef {
        name: "categories",
        table: "categories",
        columns: &[
            req("brand_id", Uuid),
            req("name", Text),
            opt("image_url", Text),
            opt("description", Text),
        ],
        search: &["name", "description"],
        order: "name asc",
        parent: Some(ParentRef { column: "brand_id", resource: "brands" }),
        author_column: None,
    },
    ResourceDef {
        name: "subcategories",
        table: "subcategories",
        columns: &[req("category_id", Uuid), req("name", Text), opt("content", Text)],
        search: &["name", "content"],
        order: "name asc",
        parent: Some(ParentRef { column: "category_id", resource: "categories" }),
        author_column: None,
    },
    ResourceDef {
        name: "products",
        table: "products",
        columns: &[
            req("subcategory_id", Uuid),
            req("name", Text),
            opt("image_url", Text),
            opt("description", Text),
        ],
        search: &["name", "description"],
        order: "name asc",
        parent: Some(ParentRef { column: "subcategory_id", resource: "subcategories" }),
        author_column: None,
    },
    ResourceDef {
        name: "product-details",
        table: "product_details",
        columns: &[
            req("product_id", Uuid),
            req("name", Text),
            opt("detail", Text),
            opt("image_url", Text),
        ],
        search: &["name", "detail"],
        order: "name asc",
        parent: Some(ParentRef { column: "product_id", resource: "products" }),
        author_column: None,
    },
    // SOP
    ResourceDef {
        name: "kategori-sop",
        table: "kategori_sop",
        columns: &[req("kategori", Text), opt("image_url", Text)],
        search: &["kategori"],
        order: "kategori asc",
        parent: None,
        author_column: None,
    },
    ResourceDef {
        name: "sop",
        table: "sop",
        columns: &[req("kategori_sop_id", Uuid), req("judul", Text)],
        search: &["judul"],
        order: "judul asc",
        parent: Some(ParentRef { column: "kategori_sop_id", resource: "kategori-sop" }),
        author_column: None,
    },
    ResourceDef {
        name: "jenis-sop",
        table: "jenis_sop",
        columns: &[req("sop_id", Uuid), req("nama", Text), opt("content", Text)],
        search: &["nama", "content"],
        order: "nama asc",
        parent: Some(ParentRef { column: "sop_id", resource: "sop" }),
        author_column: None,
    },
    ResourceDef {
        name: "detail-sop",
        table: "detail_sop",
        columns: &[req("jenis_sop_id", Uuid), req("nama", Text), opt("deskripsi", Text)],
        search: &["nama", "deskripsi"],
        order: "nama asc",
        parent: Some(ParentRef { column: "jenis_sop_id", resource: "jenis-sop" }),
        author_column: None,
    },
    // Quality training
    ResourceDef {
        name: "quality-training",
        table: "quality_training",
        columns: &[req("judul", Text), opt("image_url", Text)],
        search: &["judul"],
        order: "judul asc",
        parent: None,
        author_column: None,
    },
    ResourceDef {
        name: "jenis-quality-training",
        table: "jenis_quality_training",
        columns: &[req("quality_training_id", Uuid), req("nama", Text)],
        search: &["nama"],
        order: "nama asc",
        parent: Some(ParentRef { column: "quality_training_id", resource: "quality-training" }),
        author_column: None,
    },
    ResourceDef {
        name: "detail-quality-training",
        table: "detail_quality_training",
        columns: &[
            req("jenis_quality_training_id", Uuid),
            req("nama", Text),
            opt("deskripsi", Text),
        ],
        search: &["nama", "deskripsi"],
        order: "nama asc",
        parent: Some(ParentRef {
            column: "jenis_quality_training_id",
            resource: "jenis-quality-training",
        }),
        author_column: None,
    },
    ResourceDef {
        name: "subdetail-quality-training",
        table: "subdetail_quality_training",
        columns: &[
            req("detail_quality_training_id", Uuid),
            req("nama", Text),
            opt("isi", Text),
        ],
        search: &["nama", "isi"],
        order: "nama asc",
        parent: Some(ParentRef {
            column: "detail_quality_training_id",
            resource: "detail-quality-training",
        }),
        author_column: None,
    },
    // Knowledge base
    ResourceDef {
        name: "knowledge",
        table: "knowledge",
        columns: &[
            req("judul", Text),
            opt("deskripsi", Text),
            opt("status", Choice(KNOWLEDGE_STATUS)),
        ],
        search: &["judul", "deskripsi"],
        order: "created_at desc",
        parent: None,
        author_column: None,
    },
    ResourceDef {
        name: "detail-knowledge",
        table: "detail_knowledge",
        columns: &[req("knowledge_id", Uuid), req("nama", Text), opt("deskripsi", Text)],
        search: &["nama", "deskripsi"],
        order: "nama asc",
        parent: Some(ParentRef { column: "knowledge_id", resource: "knowledge" }),
        author_column: None,
    },
    ResourceDef {
        name: "jenis-detail-knowledge",
        table: "jenis_detail_knowledge",
        columns: &[
            req("detail_knowledge_id", Uuid),
            req("nama", Text),
            opt("deskripsi", Text),
        ],
        search: &["nama", "deskripsi"],
        order: "nama asc",
        parent: Some(ParentRef { column: "detail_knowledge_id", resource: "detail-knowledge" }),
        author_column: None,
    },
    ResourceDef {
        name: "produk-jenis-detail-knowledge",
        table: "produk_jenis_detail_knowledge",
        columns: &[
            req("jenis_detail_knowledge_id", Uuid),
            req("produk", Text),
            opt("deskripsi", Text),
            opt("logo_url", Text),
        ],
        search: &["produk", "deskripsi"],
        order: "produk asc",
        parent: Some(ParentRef {
            column: "jenis_detail_knowledge_id",
            resource: "jenis-detail-knowledge",
        }),
        author_column: None,
    },
    // Operations
    ResourceDef {
        name: "agents",
        table: "agents",
        columns: &[
            opt("user_id", Uuid),
            req("name", Text),
            opt("email", Text),
            opt("team", Text),
            opt("status", Choice(AGENT_STATUS)),
        ],
        search: &["name", "email", "team"],
        order: "name asc",
        parent: None,
        author_column: None,
    },
    ResourceDef {
        name: "performance",
        table: "performance",
        columns: &[
            req("agent_id", Uuid),
            req("period", Date),
            opt("handled_calls", Integer),
            opt("resolved_calls", Integer),
            opt("quality_score", Number),
            opt("csat_score", Number),
            opt("notes", Text),
        ],
        search: &["notes"],
        order: "period desc",
        parent: Some(ParentRef { column: "agent_id", resource: "agents" }),
        author_column: None,
    },
    ResourceDef {
        name: "announcements",
        table: "announcements",
        columns: &[
            req("title", Text),
            req("content", Text),
            opt("image_url", Text),
            opt("published", Boolean),
            opt("author_id", Uuid),
            opt("tags", TextArray),
        ],
        search: &["title", "content"],
        order: "created_at desc",
        parent: None,
        author_column: Some("author_id"),
    },
];

pub fn find(name: &str) -> Option<&'static ResourceDef> {
    RESOURCES.iter().find(|r| r.name == name)
}

/// Tables that carry the audit trigger
pub fn audited_tables() -> Vec<&'static str> {
    std::iter::once("users").chain(RESOURCES.iter().map(|r| r.table)).collect()
}
