//! Embedding storage format and the `cosine_distance` SQL function.
//!
//! Vectors are stored as BLOBs of little-endian `f32`, row-major, with no
//! header; the length is implied by the blob size.

use ndarray::ArrayView1;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;

pub fn encode(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a stored vector. Returns `None` if the blob is not a whole number
/// of floats.
pub fn decode(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// Undefined (returns `None`) when either vector has zero norm or the lengths
/// differ.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let a: Vec<f64> = a.iter().map(|&x| x as f64).collect();
    let b: Vec<f64> = b.iter().map(|&x| x as f64).collect();
    let a = ArrayView1::from(&a[..]);
    let b = ArrayView1::from(&b[..]);

    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let similarity = (a.dot(&b) / (norm_a * norm_b)).clamp(-1.0, 1.0);
    Some(1.0 - similarity)
}

/// SQL: `cosine_distance(blob, blob) -> REAL | NULL`.
///
/// NULL inputs and zero vectors yield NULL so they never satisfy a score
/// predicate. Blobs of different lengths are an error.
fn cosine_distance_sql(ctx: &Context<'_>) -> rusqlite::Result<Option<f64>> {
    let (a, b) = match (ctx.get_raw(0), ctx.get_raw(1)) {
        (ValueRef::Blob(a), ValueRef::Blob(b)) => (a, b),
        (ValueRef::Null, _) | (_, ValueRef::Null) => return Ok(None),
        _ => {
            return Err(rusqlite::Error::UserFunctionError(
                "cosine_distance expects two BLOB vectors".into(),
            ))
        }
    };

    if a.len() != b.len() {
        return Err(rusqlite::Error::UserFunctionError(
            format!(
                "cosine_distance: vector lengths differ ({} vs {} bytes)",
                a.len(),
                b.len()
            )
            .into(),
        ));
    }

    match (decode(a), decode(b)) {
        (Some(a), Some(b)) => Ok(cosine_distance(&a, &b)),
        _ => Err(rusqlite::Error::UserFunctionError(
            "cosine_distance: malformed vector blob".into(),
        )),
    }
}

/// Register the vector functions on a connection.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "cosine_distance",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        cosine_distance_sql,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let vector = vec![1.0f32, -0.5, 0.25, f32::MIN_POSITIVE];
        let bytes = encode(&vector);
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode(&bytes).unwrap(), vector);
        assert!(decode(&bytes[..15]).is_none());
    }

    #[test]
    fn test_cosine_distance_values() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).unwrap().abs() < 1e-12);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 3.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_distance_undefined() {
        assert!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]).is_none());
        assert!(cosine_distance(&[1.0], &[1.0, 0.0]).is_none());
        assert!(cosine_distance(&[], &[]).is_none());
    }

    #[test]
    fn test_sql_function() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();

        let distance: Option<f64> = conn
            .query_row(
                "SELECT cosine_distance(?1, ?2)",
                rusqlite::params![encode(&[1.0, 0.0]), encode(&[0.0, 1.0])],
                |row| row.get(0),
            )
            .unwrap();
        assert!((distance.unwrap() - 1.0).abs() < 1e-12);

        let null: Option<f64> = conn
            .query_row(
                "SELECT cosine_distance(NULL, ?1)",
                rusqlite::params![encode(&[1.0])],
                |row| row.get(0),
            )
            .unwrap();
        assert!(null.is_none());

        let mismatch = conn.query_row(
            "SELECT cosine_distance(?1, ?2)",
            rusqlite::params![encode(&[1.0, 0.0]), encode(&[1.0])],
            |row| row.get::<_, Option<f64>>(0),
        );
        assert!(mismatch.is_err());
    }
}
