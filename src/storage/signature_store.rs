use crate::common::{ExamId, ProctorError, Result};
use crate::storage::label::normalize_label;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const STORAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacialSignature {
    pub student_label: String,
    pub feature_vector: Vec<f32>,
}

impl FacialSignature {
    pub fn new(student_label: impl Into<String>, feature_vector: Vec<f32>) -> Self {
        Self { student_label: student_label.into(), feature_vector }
    }
}

/// The enrolled roster of one exam, at most one signature per label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignatureSet {
    exam_id: ExamId,
    signatures: Vec<FacialSignature>,
}

impl SignatureSet {
    pub fn new(exam_id: ExamId) -> Self {
        Self { exam_id, signatures: Vec::new() }
    }

    pub fn from_records(exam_id: ExamId, records: impl IntoIterator<Item = FacialSignature>) -> Self {
        let mut set = Self::new(exam_id);
        for record in records {
            set.insert(record);
        }
        set
    }

    pub fn exam_id(&self) -> ExamId {
        self.exam_id
    }

    /// Replaces any existing signature with the same label, keeping its position.
    pub fn insert(&mut self, signature: FacialSignature) {
        match self.signatures.iter_mut().find(|s| s.student_label == signature.student_label) {
            Some(existing) => *existing = signature,
            None => self.signatures.push(signature),
        }
    }

    pub fn find(&self, label: &str) -> Option<&FacialSignature> {
        self.signatures.iter().find(|s| s.student_label == label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.find(label).is_some()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.signatures.iter().map(|s| s.student_label.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FacialSignature> {
        self.signatures.iter()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

pub trait SignatureStore: Send + Sync {
    /// `Err(SignaturesNotFound)` when the exam was never extracted.
    fn get_signature_set(&self, exam_id: ExamId) -> Result<SignatureSet>;

    /// Replaces the exam's roster wholesale.
    fn save_signature_set(&self, exam_id: ExamId, records: &[FacialSignature]) -> Result<()>;

    /// True iff a signature for the normalized label exists. Store errors count as absent.
    fn verify_student(&self, exam_id: ExamId, student_label: &str) -> bool {
        let label = normalize_label(student_label);
        match self.get_signature_set(exam_id) {
            Ok(set) => set.contains(&label),
            Err(ProctorError::SignaturesNotFound(_)) => false,
            Err(e) => {
                tracing::warn!("Could not load signatures for exam {}: {}", exam_id, e);
                false
            }
        }
    }
}

/// A row keeps the label last, after the vector.
#[derive(Debug, Serialize, Deserialize)]
struct SignatureRow(Vec<f32>, String);

#[derive(Debug, Serialize, Deserialize)]
struct SignatureFile {
    version: u32,
    exam_id: ExamId,
    dimension: usize,
    digest: Vec<u8>,
    rows: Vec<SignatureRow>,
}

fn rows_digest(exam_id: ExamId, rows: &[SignatureRow]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(exam_id.to_le_bytes());
    for SignatureRow(vector, label) in rows {
        for value in vector {
            hasher.update(value.to_le_bytes());
        }
        hasher.update((label.len() as u64).to_le_bytes());
        hasher.update(label.as_bytes());
    }
    hasher.finalize().to_vec()
}

/// One `signatures_exam_<id>.bincode` file per exam.
pub struct FileSignatureStore {
    data_dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileSignatureStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        tracing::debug!("Signature store at {}", data_dir.display());

        Ok(Self { data_dir, tmp_counter: AtomicU64::new(0) })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn signature_file(&self, exam_id: ExamId) -> PathBuf {
        self.data_dir.join(format!("signatures_exam_{}.bincode", exam_id))
    }

    /// Exam ids that have a signature file, ascending.
    pub fn list_exams(&self) -> Result<Vec<ExamId>> {
        let mut exams = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let name = entry?.file_name();
            let id = name
                .to_str()
                .and_then(|n| n.strip_prefix("signatures_exam_"))
                .and_then(|n| n.strip_suffix(".bincode"))
                .and_then(|n| n.parse::<ExamId>().ok());
            if let Some(id) = id {
                exams.push(id);
            }
        }
        exams.sort_unstable();
        Ok(exams)
    }
}

impl SignatureStore for FileSignatureStore {
    fn get_signature_set(&self, exam_id: ExamId) -> Result<SignatureSet> {
        let path = self.signature_file(exam_id);
        if !path.exists() {
            return Err(ProctorError::SignaturesNotFound(exam_id));
        }

        let data = fs::read(&path)?;
        let file: SignatureFile = bincode::deserialize(&data)
            .map_err(|e| ProctorError::Storage(format!("Failed to deserialize {}: {}", path.display(), e)))?;

        if file.version > STORAGE_VERSION {
            return Err(ProctorError::Storage(format!(
                "Signature file version {} is newer than supported version {}",
                file.version, STORAGE_VERSION
            )));
        }
        if file.exam_id != exam_id {
            return Err(ProctorError::Storage(format!(
                "{} belongs to exam {}, expected {}", path.display(), file.exam_id, exam_id
            )));
        }
        if rows_digest(file.exam_id, &file.rows) != file.digest {
            return Err(ProctorError::Storage(format!("Checksum mismatch in {}", path.display())));
        }
        if let Some(SignatureRow(vector, label)) = file.rows.iter().find(|row| row.0.len() != file.dimension) {
            return Err(ProctorError::Storage(format!(
                "Signature for '{}' in {} has dimension {}, header says {}",
                label,
                path.display(),
                vector.len(),
                file.dimension
            )));
        }

        Ok(SignatureSet::from_records(
            exam_id,
            file.rows
                .into_iter()
                .map(|SignatureRow(vector, label)| FacialSignature::new(label, vector)),
        ))
    }

    fn save_signature_set(&self, exam_id: ExamId, records: &[FacialSignature]) -> Result<()> {
        let set = SignatureSet::from_records(
            exam_id,
            records.iter().map(|r| FacialSignature::new(normalize_label(&r.student_label), r.feature_vector.clone())),
        );

        let dimension = set.iter().next().map(|s| s.feature_vector.len()).unwrap_or(0);
        if let Some(bad) = set.iter().find(|s| s.feature_vector.len() != dimension || s.feature_vector.is_empty()) {
            return Err(ProctorError::Storage(format!(
                "Signature for '{}' has dimension {}, expected {}",
                bad.student_label,
                bad.feature_vector.len(),
                dimension
            )));
        }

        let rows: Vec<SignatureRow> = set
            .iter()
            .map(|s| SignatureRow(s.feature_vector.clone(), s.student_label.clone()))
            .collect();
        let file = SignatureFile {
            version: STORAGE_VERSION,
            exam_id,
            dimension,
            digest: rows_digest(exam_id, &rows),
            rows,
        };
        let encoded = bincode::serialize(&file)
            .map_err(|e| ProctorError::Storage(format!("Failed to serialize: {}", e)))?;

        let target = self.signature_file(exam_id);
        let tmp = self.data_dir.join(format!(
            ".signatures_exam_{}.{}.{}.tmp",
            exam_id,
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = fs::write(&tmp, &encoded).and_then(|_| fs::rename(&tmp, &target)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        tracing::info!("Saved {} signatures for exam {}", set.len(), exam_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileSignatureStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = FileSignatureStore::new(dir.path()).expect("store");
        (dir, store)
    }

    #[test]
    fn missing_exam_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.get_signature_set(9), Err(ProctorError::SignaturesNotFound(9))));
        assert!(!store.verify_student(9, "alice"));
    }

    #[test]
    fn duplicate_labels_keep_last_write() {
        let (_dir, store) = store();
        store
            .save_signature_set(1, &[
                FacialSignature::new("alice", vec![1.0, 0.0]),
                FacialSignature::new("bob", vec![0.0, 1.0]),
                FacialSignature::new("alice", vec![0.5, 0.5]),
            ])
            .expect("save");

        let set = store.get_signature_set(1).expect("load");
        assert_eq!(set.len(), 2);
        assert_eq!(set.find("alice").map(|s| s.feature_vector.clone()), Some(vec![0.5, 0.5]));
    }

    #[test]
    fn labels_are_normalized_on_save_and_lookup() {
        let (_dir, store) = store();
        store
            .save_signature_set(3, &[FacialSignature::new("Alice Martin", vec![1.0])])
            .expect("save");

        assert!(store.get_signature_set(3).expect("load").contains("Alice_Martin"));
        assert!(store.verify_student(3, "Alice Martin"));
        assert!(store.verify_student(3, "Alice_Martin"));
        assert!(!store.verify_student(3, "alice_martin"));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let (_dir, store) = store();
        let result = store.save_signature_set(4, &[
            FacialSignature::new("a", vec![1.0, 2.0]),
            FacialSignature::new("b", vec![1.0]),
        ]);
        assert!(result.is_err());
        assert!(!store.signature_file(4).exists());
    }

    #[test]
    fn corrupted_file_is_a_storage_error() {
        let (_dir, store) = store();
        store.save_signature_set(5, &[FacialSignature::new("a", vec![1.0, 2.0])]).expect("save");

        let path = store.signature_file(5);
        let mut bytes = fs::read(&path).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).expect("write");

        assert!(matches!(store.get_signature_set(5), Err(ProctorError::Storage(_))));
    }

    #[test]
    fn rows_must_match_header_dimension() {
        let (_dir, store) = store();
        let rows = vec![SignatureRow(vec![0.5, 0.5], "alice".into())];
        let file = SignatureFile {
            version: STORAGE_VERSION,
            exam_id: 7,
            dimension: 3,
            digest: rows_digest(7, &rows),
            rows,
        };
        fs::write(store.signature_file(7), bincode::serialize(&file).expect("encode")).expect("write");

        assert!(matches!(store.get_signature_set(7), Err(ProctorError::Storage(_))));
        assert!(!store.verify_student(7, "alice"));
    }

    #[test]
    fn resave_replaces_roster_and_leaves_no_temp_files() {
        let (dir, store) = store();
        store.save_signature_set(6, &[FacialSignature::new("a", vec![1.0])]).expect("save");
        store.save_signature_set(6, &[FacialSignature::new("b", vec![2.0])]).expect("save");

        assert_eq!(store.get_signature_set(6).expect("load").labels(), vec!["b"]);
        assert_eq!(store.list_exams().expect("list"), vec![6]);

        let leftovers = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
