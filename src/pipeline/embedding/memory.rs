//! In-memory vector store used by tests and local development.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::{VectorPoint, VectorStore, VectorStoreError};

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, HashMap<Uuid, VectorPoint>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_collections<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, HashMap<Uuid, VectorPoint>>) -> T,
    ) -> T {
        let mut guard = match self.collections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        self.with_collections(|c| {
            c.entry(name.to_string()).or_default();
        });
        Ok(())
    }

    fn delete_collection(&self, name: &str) -> Result<(), VectorStoreError> {
        self.with_collections(|c| {
            c.remove(name);
        });
        Ok(())
    }

    fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), VectorStoreError> {
        self.with_collections(|c| {
            let coll = c
                .get_mut(collection)
                .ok_or_else(|| VectorStoreError::CollectionMissing(collection.to_string()))?;
            for point in points {
                coll.insert(point.id, point);
            }
            Ok(())
        })
    }

    fn copy_points(&self, from: &str, to: &str, ids: &[Uuid]) -> Result<(), VectorStoreError> {
        self.with_collections(|c| {
            if !c.contains_key(to) {
                return Err(VectorStoreError::CollectionMissing(to.to_string()));
            }
            let source = c
                .get(from)
                .ok_or_else(|| VectorStoreError::CollectionMissing(from.to_string()))?;
            let mut copied = Vec::with_capacity(ids.len());
            for id in ids {
                let point = source
                    .get(id)
                    .ok_or(VectorStoreError::PointMissing(*id))?;
                copied.push(point.clone());
            }
            let target = c
                .get_mut(to)
                .ok_or_else(|| VectorStoreError::CollectionMissing(to.to_string()))?;
            for point in copied {
                target.insert(point.id, point);
            }
            Ok(())
        })
    }

    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorPoint>, VectorStoreError> {
        self.with_collections(|c| {
            let coll = c
                .get(collection)
                .ok_or_else(|| VectorStoreError::CollectionMissing(collection.to_string()))?;
            let mut scored: Vec<(f32, VectorPoint)> = coll
                .values()
                .map(|p| (cosine_similarity(vector, &p.vector), p.clone()))
                .collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            Ok(scored.into_iter().take(k).map(|(_, p)| p).collect())
        })
    }

    fn count(&self, collection: &str) -> Result<usize, VectorStoreError> {
        self.with_collections(|c| {
            c.get(collection)
                .map(|coll| coll.len())
                .ok_or_else(|| VectorStoreError::CollectionMissing(collection.to_string()))
        })
    }

    fn collection_exists(&self, name: &str) -> bool {
        self.with_collections(|c| c.contains_key(name))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
