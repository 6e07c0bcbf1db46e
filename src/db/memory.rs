use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::models::PdfArtifact;
use crate::pdf_cache::ArtifactStore;
use crate::pipeline::HistoryError;

/// Process-local artifact store, for deployments that keep PDFs out of
/// the database and for tests.
#[derive(Default)]
pub struct MemoryArtifactStore {
    entries: RwLock<HashMap<Uuid, PdfArtifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> HistoryError {
    HistoryError::Persistence("artifact store lock poisoned".into())
}

impl ArtifactStore for MemoryArtifactStore {
    fn load_artifact(&self, history_id: &Uuid) -> Result<Option<PdfArtifact>, HistoryError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(history_id).cloned())
    }

    fn store_artifact(&self, artifact: &PdfArtifact) -> Result<(), HistoryError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(artifact.history_id, artifact.clone());
        Ok(())
    }

    fn remove_artifact(&self, history_id: &Uuid) -> Result<bool, HistoryError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(history_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(id: Uuid, bytes: &[u8]) -> PdfArtifact {
        PdfArtifact {
            history_id: id,
            filename: "Historial_Medico_Paciente_20250101.pdf".into(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn store_load_remove() {
        let store = MemoryArtifactStore::new();
        let id = Uuid::new_v4();
        assert!(store.load_artifact(&id).unwrap().is_none());

        store.store_artifact(&artifact(id, b"one")).unwrap();
        assert_eq!(store.load_artifact(&id).unwrap().unwrap().bytes, b"one");
        assert_eq!(store.len(), 1);

        assert!(store.remove_artifact(&id).unwrap());
        assert!(!store.remove_artifact(&id).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn store_replaces_existing_entry() {
        let store = MemoryArtifactStore::new();
        let id = Uuid::new_v4();
        store.store_artifact(&artifact(id, b"old")).unwrap();
        store.store_artifact(&artifact(id, b"new")).unwrap();
        assert_eq!(store.load_artifact(&id).unwrap().unwrap().bytes, b"new");
        assert_eq!(store.len(), 1);
    }
}
