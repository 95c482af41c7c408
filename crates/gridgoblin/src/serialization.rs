//! Chunk JSON round-tripping: one array per present building block, plus
//! a `buildingBlocks` tag string validated against the live configuration.

use serde_json::json;

use crate::building_block::{BuildingBlockMask, SpatialInfo};
use crate::chunk::Chunk;
use crate::chunk_id::ChunkId;
use crate::error::ChunkError;

pub fn chunk_to_json(chunk: &Chunk) -> serde_json::Value {
    let mask = chunk.present_mask();
    let mut map = serde_json::Map::new();
    map.insert("buildingBlocks".into(), json!(mask.to_tag_string()));
    if let Some(v) = &chunk.cell_kind_id {
        map.insert("CELL_KIND_ID".into(), json!(v));
    }
    if let Some(v) = &chunk.floor_sprite {
        map.insert("FLOOR_SPRITE".into(), json!(v));
    }
    if let Some(v) = &chunk.wall_sprite {
        map.insert("WALL_SPRITE".into(), json!(v));
    }
    if let Some(v) = &chunk.spatial_info {
        map.insert("SPATIAL_INFO".into(), json!(v));
    }
    if let Some(v) = &chunk.renderer_aux_data {
        map.insert("RENDERER_AUX_DATA".into(), json!(v));
    }
    if let Some(v) = &chunk.user_data {
        map.insert("USER_DATA".into(), json!(v));
    }
    if let Some(ext) = &chunk.extension {
        map.insert("extension".into(), ext.to_json());
    }
    serde_json::Value::Object(map)
}

/// Parses a chunk, validating its stored building-block tag against
/// `configured_mask`. Any `"extension"` member is returned verbatim for the
/// caller's binder to reconstruct, since that reconstruction is host-specific.
pub fn chunk_from_json(
    id: ChunkId,
    value: &serde_json::Value,
    configured_mask: BuildingBlockMask,
    width: u16,
    height: u16,
) -> Result<(Chunk, Option<serde_json::Value>), ChunkError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ChunkError::JsonParse(id, Default::default(), "top-level value is not an object".into()))?;

    let tag = obj
        .get("buildingBlocks")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ChunkError::JsonParse(id, Default::default(), "missing buildingBlocks".into()))?;
    let stored_mask = BuildingBlockMask::from_tag_string(tag);
    if stored_mask != configured_mask {
        return Err(ChunkError::BuildingBlockMismatch(id, stored_mask.bits(), configured_mask.bits()));
    }

    let mut chunk = Chunk::new_default(configured_mask, width, height);
    let n = chunk.cell_count();

    if configured_mask.contains(BuildingBlockMask::CELL_KIND_ID) {
        chunk.cell_kind_id = Some(parse_array(id, obj, "CELL_KIND_ID", n)?);
    }
    if configured_mask.contains(BuildingBlockMask::FLOOR_SPRITE) {
        chunk.floor_sprite = Some(parse_array(id, obj, "FLOOR_SPRITE", n)?);
    }
    if configured_mask.contains(BuildingBlockMask::WALL_SPRITE) {
        chunk.wall_sprite = Some(parse_array(id, obj, "WALL_SPRITE", n)?);
    }
    if configured_mask.contains(BuildingBlockMask::SPATIAL_INFO) {
        chunk.spatial_info = Some(parse_array::<SpatialInfo>(id, obj, "SPATIAL_INFO", n)?);
    }
    if configured_mask.contains(BuildingBlockMask::RENDERER_AUX_DATA) {
        chunk.renderer_aux_data = Some(parse_array(id, obj, "RENDERER_AUX_DATA", n)?);
    }
    if configured_mask.contains(BuildingBlockMask::USER_DATA) {
        chunk.user_data = Some(parse_array(id, obj, "USER_DATA", n)?);
    }

    let extension = obj.get("extension").cloned();
    Ok((chunk, extension))
}

fn parse_array<T: serde::de::DeserializeOwned>(
    id: ChunkId,
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &'static str,
    expected_len: usize,
) -> Result<Vec<T>, ChunkError> {
    let value = obj
        .get(key)
        .ok_or_else(|| ChunkError::JsonParse(id, Default::default(), format!("missing array {key}")))?;
    let parsed: Vec<T> =
        serde_json::from_value(value.clone()).map_err(|e| ChunkError::JsonParse(id, Default::default(), e.to_string()))?;
    if parsed.len() != expected_len {
        return Err(ChunkError::JsonParse(
            id,
            Default::default(),
            format!("{key} has {} entries, expected {expected_len}", parsed.len()),
        ));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_chunk_with_all_blocks() {
        let mask = BuildingBlockMask::all();
        let mut chunk = Chunk::new_default(mask, 2, 2);
        chunk.floor_sprite.as_mut().unwrap()[1] = 7;
        let value = chunk_to_json(&chunk);

        let (decoded, extension) = chunk_from_json(ChunkId::new(0, 0), &value, mask, 2, 2).unwrap();
        assert_eq!(decoded.floor_sprite.as_ref().unwrap()[1], 7);
        assert!(extension.is_none());
    }

    #[test]
    fn mismatched_building_blocks_is_fatal() {
        let mask = BuildingBlockMask::FLOOR_SPRITE;
        let chunk = Chunk::new_default(mask, 2, 2);
        let value = chunk_to_json(&chunk);

        let wrong_mask = BuildingBlockMask::FLOOR_SPRITE | BuildingBlockMask::SPATIAL_INFO;
        let result = chunk_from_json(ChunkId::new(0, 0), &value, wrong_mask, 2, 2);
        assert!(matches!(result, Err(ChunkError::BuildingBlockMismatch(..))));
    }
}
