//! Model Snapshots
//!
//! A snapshot stores every classifier parameter together with the
//! hyperparameters needed to rebuild their shapes, so a loaded model behaves
//! exactly like the one that was saved.
//!
//! ## File Format
//!
//! ```text
//! b"TEXTCNN_SNAP"                  magic (12 bytes)
//! u8                               format version (1)
//! u32 LE + JSON                    TextCnnConfig
//! tensor                           embeddings [vocab, D]
//! tensor × widths                  filter banks, in filter_sizes order
//! tensor                           fc weight [F · widths, classes]
//! tensor                           fc bias [1, classes]
//! u32 LE + JSON                    CheckpointMetadata
//!
//! tensor := u32 rank, u32 dims[rank], u32 len, f32 LE values[len]
//! ```
//!
//! Values are written bit for bit, so parameters round-trip exactly.

use crate::error::{Error, Result};
use crate::model::{TextCnn, TextCnnConfig, TextCnnParameters};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 12] = b"TEXTCNN_SNAP";
const VERSION: u8 = 1;
const MAX_RANK: usize = 8;

/// Training progress stored next to the parameters
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Epochs completed when the snapshot was taken
    pub epoch: usize,
    pub train_loss: Option<f32>,
    pub best_val_loss: Option<f32>,
}

/// A classifier plus training metadata
pub struct Checkpoint {
    pub model: TextCnn,
    pub metadata: CheckpointMetadata,
}

impl Checkpoint {
    /// Save checkpoint to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        write_snapshot(&mut writer, &self.model, &self.metadata)?;
        writer.flush()?;

        tracing::info!(
            path = %path.display(),
            epoch = self.metadata.epoch,
            parameters = self.model.num_parameters(),
            "saved snapshot"
        );
        Ok(())
    }

    /// Load checkpoint from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let checkpoint = read_snapshot(&mut reader)?;
        tracing::info!(
            path = %path.display(),
            epoch = checkpoint.metadata.epoch,
            "loaded snapshot"
        );
        Ok(checkpoint)
    }
}

/// Load the classifier of a snapshot written by [`Checkpoint::save`]
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<TextCnn> {
    Ok(Checkpoint::load(path)?.model)
}

/// Serialize a snapshot into any writer
pub fn write_snapshot<W: Write>(
    writer: &mut W,
    model: &TextCnn,
    metadata: &CheckpointMetadata,
) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&[VERSION])?;

    write_json(writer, model.config())?;

    write_tensor(writer, model.embeddings())?;
    for bank in model.filter_banks() {
        write_tensor(writer, bank)?;
    }
    write_tensor(writer, model.fc_weight())?;
    write_tensor(writer, model.fc_bias())?;

    write_json(writer, metadata)?;
    Ok(())
}

/// Deserialize a snapshot from any reader
///
/// # Errors
///
/// [`Error::InvalidSnapshot`] for a wrong magic header, version or tensor
/// layout; [`Error::InvalidShape`] if a tensor doesn't fit the stored config.
pub fn read_snapshot<R: Read>(reader: &mut R) -> Result<Checkpoint> {
    let mut header = [0u8; 12];
    reader.read_exact(&mut header)?;
    if &header != MAGIC {
        return Err(Error::InvalidSnapshot(
            "invalid header - expected TEXTCNN_SNAP".into(),
        ));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != VERSION {
        return Err(Error::InvalidSnapshot(format!(
            "unsupported snapshot version: {}",
            version[0]
        )));
    }

    let config: TextCnnConfig = read_json(reader)?;

    let embeddings = read_tensor(reader)?;
    let filters = config
        .filter_sizes
        .iter()
        .map(|_| read_tensor(reader))
        .collect::<Result<Vec<_>>>()?;
    let fc_weight = read_tensor(reader)?;
    let fc_bias = read_tensor(reader)?;

    let metadata: CheckpointMetadata = read_json(reader)?;

    let model = TextCnn::from_parameters(
        config,
        TextCnnParameters {
            embeddings,
            filters,
            fc_weight,
            fc_bias,
        },
    )?;
    Ok(Checkpoint { model, metadata })
}

fn write_u32<W: Write>(writer: &mut W, value: usize) -> Result<()> {
    let value = u32::try_from(value)
        .map_err(|_| Error::InvalidSnapshot(format!("{value} does not fit in u32")))?;
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R) -> Result<usize> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes) as usize)
}

fn write_json<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    write_u32(writer, json.len())?;
    writer.write_all(&json)?;
    Ok(())
}

fn read_json<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> Result<T> {
    let len = read_u32(reader)?;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_tensor<W: Write>(writer: &mut W, tensor: &Tensor) -> Result<()> {
    write_u32(writer, tensor.shape.len())?;
    for &dim in &tensor.shape {
        write_u32(writer, dim)?;
    }
    write_u32(writer, tensor.data.len())?;

    let mut bytes = Vec::with_capacity(tensor.data.len() * 4);
    for &val in &tensor.data {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    writer.write_all(&bytes)?;
    Ok(())
}

fn read_tensor<R: Read>(reader: &mut R) -> Result<Tensor> {
    let rank = read_u32(reader)?;
    if rank > MAX_RANK {
        return Err(Error::InvalidSnapshot(format!("tensor rank {rank} too large")));
    }
    let shape = (0..rank).map(|_| read_u32(reader)).collect::<Result<Vec<_>>>()?;

    let expected = shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| Error::InvalidSnapshot(format!("tensor shape {shape:?} overflows")))?;
    let len = read_u32(reader)?;
    if len != expected {
        return Err(Error::InvalidSnapshot(format!(
            "tensor of shape {shape:?} declares {len} values"
        )));
    }

    let byte_len = len
        .checked_mul(4)
        .ok_or_else(|| Error::InvalidSnapshot(format!("tensor of {len} values is too large")))?;
    let mut bytes = vec![0u8; byte_len];
    reader.read_exact(&mut bytes)?;
    let data = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Tensor::try_new(data, shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn model() -> TextCnn {
        TextCnn::new(TextCnnConfig {
            vocab_size: 7,
            embedding_dim: 3,
            max_len: 4,
            num_filters: 2,
            filter_sizes: vec![2, 3],
            num_classes: 2,
            learning_rate: 0.05,
            seed: 11,
        })
        .unwrap()
    }

    #[test]
    fn test_roundtrip_in_memory() {
        let original = model();
        let metadata = CheckpointMetadata {
            epoch: 3,
            train_loss: Some(0.5),
            best_val_loss: None,
        };

        let mut buf = Vec::new();
        write_snapshot(&mut buf, &original, &metadata).unwrap();
        let restored = read_snapshot(&mut Cursor::new(buf)).unwrap();

        assert_eq!(restored.metadata, metadata);
        assert_eq!(restored.model.config(), original.config());
        assert_eq!(restored.model.parameters(), original.parameters());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &model(), &CheckpointMetadata::default()).unwrap();
        buf[0] = b'X';
        assert!(matches!(
            read_snapshot(&mut Cursor::new(buf)),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &model(), &CheckpointMetadata::default()).unwrap();
        buf[12] = 9;
        assert!(matches!(
            read_snapshot(&mut Cursor::new(buf)),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_rejects_overflowing_tensor_shape() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        write_json(&mut buf, model().config()).unwrap();
        write_u32(&mut buf, 3).unwrap();
        for _ in 0..3 {
            buf.extend_from_slice(&u32::MAX.to_le_bytes());
        }
        buf.extend_from_slice(&u32::MAX.to_le_bytes());

        assert!(matches!(
            read_snapshot(&mut Cursor::new(buf)),
            Err(Error::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_truncated_file_is_io_error() {
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &model(), &CheckpointMetadata::default()).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(matches!(read_snapshot(&mut Cursor::new(buf)), Err(Error::Io(_))));
    }
}
