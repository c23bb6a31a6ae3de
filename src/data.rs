//! IDX (MNIST-style) dataset files, in-memory splits and one-hot targets.
//!
//! An IDX file starts with a big-endian header: magic `2051` followed by item
//! count, rows and cols for images, or magic `2049` followed by item count for
//! labels. The payload is one unsigned byte per pixel / label.

use std::fs;
use std::path::{Path, PathBuf};

use crate::prelude::*;

pub const IMAGES_MAGIC: u32 = 2051;
pub const LABELS_MAGIC: u32 = 2049;

/// Which dataset family to read, and where its files live under a root directory.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Mnist,
    FashionMnist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl DatasetKind {
    pub fn dir(&self) -> &'static str {
        match self {
            Self::Mnist => "mnist",
            Self::FashionMnist => "fashion_mnist",
        }
    }

    /// `(images, labels)` file names. The MNIST copies use a dot before the
    /// `idxN` suffix, Fashion-MNIST keeps the upstream dash.
    pub fn file_names(&self, split: Split) -> (String, String) {
        let prefix = match split {
            Split::Train => "train",
            Split::Test => "t10k",
        };
        let sep = match self {
            Self::Mnist => '.',
            Self::FashionMnist => '-',
        };
        (
            format!("{prefix}-images{sep}idx3-ubyte"),
            format!("{prefix}-labels{sep}idx1-ubyte"),
        )
    }

    pub fn paths<P: AsRef<Path>>(&self, root: P, split: Split) -> (PathBuf, PathBuf) {
        let dir = root.as_ref().join(self.dir());
        let (images, labels) = self.file_names(split);
        (dir.join(images), dir.join(labels))
    }
}

fn read_be_u32(bytes: &[u8], offset: usize, what: &str) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| NNError::DatasetFormat(format!("truncated header while reading {what}")))
}

/// Parses an IDX3 image file into a `count × (rows·cols)` byte matrix.
pub fn parse_idx_images(bytes: &[u8]) -> Result<(usize, usize, Array2<u8>)> {
    let magic = read_be_u32(bytes, 0, "magic")?;
    if magic != IMAGES_MAGIC {
        return Err(NNError::DatasetFormat(format!(
            "image file magic is {magic}, expected {IMAGES_MAGIC}"
        )));
    }
    let count = read_be_u32(bytes, 4, "item count")? as usize;
    let rows = read_be_u32(bytes, 8, "row count")? as usize;
    let cols = read_be_u32(bytes, 12, "column count")? as usize;
    let overflow = || NNError::DatasetFormat(format!("header {count}x{rows}x{cols} overflows usize"));
    let pixels = rows.checked_mul(cols).ok_or_else(overflow)?;
    let total = count.checked_mul(pixels).ok_or_else(overflow)?;
    let payload = &bytes[16..];
    if payload.len() < total {
        return Err(NNError::DatasetFormat(format!(
            "expected {} pixel bytes for {} images, found {}",
            total,
            count,
            payload.len()
        )));
    }
    let images = Array2::from_shape_vec((count, pixels), payload[..total].to_vec())?;
    Ok((rows, cols, images))
}

/// Parses an IDX1 label file.
pub fn parse_idx_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    let magic = read_be_u32(bytes, 0, "magic")?;
    if magic != LABELS_MAGIC {
        return Err(NNError::DatasetFormat(format!(
            "label file magic is {magic}, expected {LABELS_MAGIC}"
        )));
    }
    let count = read_be_u32(bytes, 4, "item count")? as usize;
    let payload = &bytes[8..];
    if payload.len() < count {
        return Err(NNError::DatasetFormat(format!(
            "expected {} labels, found {}",
            count,
            payload.len()
        )));
    }
    Ok(payload[..count].to_vec())
}

/// Encodes images (`count × (rows·cols)`) as an IDX3 byte stream.
pub fn encode_idx_images(images: &Array2<u8>, rows: usize, cols: usize) -> Result<Vec<u8>> {
    if images.ncols() != rows * cols {
        return Err(NNError::InvalidInputShape(format!(
            "{} pixels per image do not match {}x{}",
            images.ncols(),
            rows,
            cols
        )));
    }
    let mut out = Vec::with_capacity(16 + images.len());
    for v in [IMAGES_MAGIC, images.nrows() as u32, rows as u32, cols as u32] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend(images.iter().copied());
    Ok(out)
}

/// Encodes labels as an IDX1 byte stream.
pub fn encode_idx_labels(labels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + labels.len());
    out.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
    out.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    out.extend_from_slice(labels);
    out
}

/// Pixels as stored on disk (0..=255), for the integer-only trainer.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub images: Array2<u8>,
    pub labels: Vec<usize>,
    pub rows: usize,
    pub cols: usize,
}

impl RawDataset {
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(images_path: P, labels_path: Q) -> Result<Self> {
        let image_bytes = fs::read(images_path.as_ref())?;
        let (rows, cols, images) = parse_idx_images(&image_bytes)?;
        log::info!(
            "Loaded {}: items={}, rows={}, cols={}",
            images_path.as_ref().display(),
            images.nrows(),
            rows,
            cols
        );

        let labels = parse_idx_labels(&fs::read(labels_path.as_ref())?)?;
        log::info!("Loaded {}: items={}", labels_path.as_ref().display(), labels.len());

        if labels.len() != images.nrows() {
            return Err(NNError::DatasetFormat(format!(
                "{} images but {} labels",
                images.nrows(),
                labels.len()
            )));
        }
        Ok(Self {
            images,
            labels: labels.into_iter().map(usize::from).collect(),
            rows,
            cols,
        })
    }

    pub fn load<P: AsRef<Path>>(kind: DatasetKind, split: Split, root: P) -> Result<Self> {
        let (images, labels) = kind.paths(root, split);
        Self::from_files(images, labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Flattened images scaled to [0, 1].
    pub fn to_unit(&self) -> Dataset {
        let mut images = self.images.mapv(f64::from);
        images.to_unity(0.0, 255.0);
        Dataset { images, labels: self.labels.clone() }
    }
}

/// Flattened images in [0, 1] with integer class labels. Immutable after load.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub images: Array2<f64>,
    pub labels: Vec<usize>,
}

impl Dataset {
    pub fn new(images: Array2<f64>, labels: Vec<usize>) -> Result<Self> {
        if images.nrows() != labels.len() {
            return Err(NNError::DatasetFormat(format!(
                "{} images but {} labels",
                images.nrows(),
                labels.len()
            )));
        }
        Ok(Self { images, labels })
    }

    pub fn load<P: AsRef<Path>>(kind: DatasetKind, split: Split, root: P) -> Result<Self> {
        Ok(RawDataset::load(kind, split, root)?.to_unit())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.images.ncols()
    }

    /// Gathers the rows named by `indices` into a batch.
    pub fn batch(&self, indices: &[usize]) -> (Array2<f64>, Vec<usize>) {
        let x = self.images.select(Axis(0), indices);
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        (x, labels)
    }
}

/// One row per label with a single `1.0` at the label index.
pub fn one_hot(labels: &[usize], num_classes: usize) -> Result<Array2<f64>> {
    one_hot_with(labels, num_classes, 1.0)
}

/// One-hot rows with an arbitrary "hot" value, e.g. `15` for the integer trainer.
pub fn one_hot_with<A: Clone + Default>(labels: &[usize], num_classes: usize, hot: A) -> Result<Array2<A>> {
    let mut out = Array2::from_elem((labels.len(), num_classes), A::default());
    for (r, &label) in labels.iter().enumerate() {
        if label >= num_classes {
            return Err(NNError::LabelOutOfRange { label, num_classes });
        }
        out[[r, label]] = hot.clone();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_images() -> Array2<u8> {
        array![[0, 255, 10, 20], [1, 2, 3, 4], [255, 255, 0, 0]]
    }

    #[test]
    fn image_header_round_trip() {
        let bytes = encode_idx_images(&tiny_images(), 2, 2).unwrap();
        assert_eq!(&bytes[..4], &[0, 0, 8, 3]);
        let (rows, cols, images) = parse_idx_images(&bytes).unwrap();
        assert_eq!((rows, cols), (2, 2));
        assert_eq!(images, tiny_images());
    }

    #[test]
    fn label_header_round_trip() {
        let bytes = encode_idx_labels(&[7, 0, 9]);
        assert_eq!(&bytes[..4], &[0, 0, 8, 1]);
        assert_eq!(parse_idx_labels(&bytes).unwrap(), vec![7, 0, 9]);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let bytes = encode_idx_labels(&[1, 2]);
        assert!(matches!(parse_idx_images(&bytes), Err(NNError::DatasetFormat(_))));
        let bytes = encode_idx_images(&tiny_images(), 2, 2).unwrap();
        assert!(matches!(parse_idx_labels(&bytes), Err(NNError::DatasetFormat(_))));
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let mut bytes = encode_idx_images(&tiny_images(), 2, 2).unwrap();
        bytes.pop();
        assert!(matches!(parse_idx_images(&bytes), Err(NNError::DatasetFormat(_))));
        assert!(matches!(parse_idx_labels(&[0, 0, 8]), Err(NNError::DatasetFormat(_))));
    }

    #[test]
    fn oversized_header_is_rejected_without_overflow() {
        let mut bytes = Vec::new();
        for v in [IMAGES_MAGIC, u32::MAX, u32::MAX, u32::MAX] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend_from_slice(&[0; 8]);
        assert!(matches!(parse_idx_images(&bytes), Err(NNError::DatasetFormat(_))));
    }

    #[test]
    fn loads_from_disk_and_scales_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let (img_path, lbl_path) = DatasetKind::Mnist.paths(dir.path(), Split::Test);
        fs::create_dir_all(img_path.parent().unwrap()).unwrap();
        fs::write(&img_path, encode_idx_images(&tiny_images(), 2, 2).unwrap()).unwrap();
        fs::write(&lbl_path, encode_idx_labels(&[3, 1, 4])).unwrap();

        let ds = Dataset::load(DatasetKind::Mnist, Split::Test, dir.path()).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.num_features(), 4);
        assert_eq!(ds.labels, vec![3, 1, 4]);
        assert_eq!(ds.images[[0, 1]], 1.0);
        assert!(ds.images.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn image_label_count_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("img");
        let lbl = dir.path().join("lbl");
        fs::write(&img, encode_idx_images(&tiny_images(), 2, 2).unwrap()).unwrap();
        fs::write(&lbl, encode_idx_labels(&[3, 1])).unwrap();
        assert!(matches!(RawDataset::from_files(&img, &lbl), Err(NNError::DatasetFormat(_))));
    }

    #[test]
    fn file_names_follow_dataset_family() {
        assert_eq!(
            DatasetKind::Mnist.file_names(Split::Train),
            ("train-images.idx3-ubyte".to_string(), "train-labels.idx1-ubyte".to_string())
        );
        assert_eq!(
            DatasetKind::FashionMnist.file_names(Split::Test).0,
            "t10k-images-idx3-ubyte"
        );
    }

    #[test]
    fn one_hot_has_exactly_one_hot_entry_per_row() {
        let labels: Vec<usize> = (0..10).chain([3, 3, 9]).collect();
        let y = one_hot(&labels, 10).unwrap();
        for (row, &label) in y.rows().into_iter().zip(&labels) {
            assert_eq!(row.iter().filter(|&&v| v == 1.0).count(), 1);
            assert_eq!(row.iter().filter(|&&v| v == 0.0).count(), 9);
            assert_eq!(row[label], 1.0);
        }
    }

    #[test]
    fn one_hot_rejects_out_of_range_label() {
        assert!(matches!(
            one_hot(&[2, 10], 10),
            Err(NNError::LabelOutOfRange { label: 10, num_classes: 10 })
        ));
    }

    #[test]
    fn one_hot_with_custom_hot_value() {
        let y = one_hot_with(&[1], 3, 15i64).unwrap();
        assert_eq!(y, array![[0, 15, 0]]);
    }

    #[test]
    fn batch_gathers_rows_in_order() {
        let ds = RawDataset {
            images: tiny_images(),
            labels: vec![5, 6, 7],
            rows: 2,
            cols: 2,
        }
        .to_unit();
        let (x, labels) = ds.batch(&[2, 0]);
        assert_eq!(labels, vec![7, 5]);
        assert_eq!(x.row(0), ds.images.row(2));
    }
}
