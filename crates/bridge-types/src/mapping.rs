//! Product mapping types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mapping from a remote product reference to a local product.
///
/// Unique on `remote_product_id`; creation is idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMapping {
	pub remote_product_id: String,
	pub sku: Option<String>,
	pub local_product_id: String,
	pub created_at: DateTime<Utc>,
}

/// Minimal view of a local product, as exposed by the catalog collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProduct {
	pub id: String,
	pub sku: Option<String>,
	pub name: String,
}
