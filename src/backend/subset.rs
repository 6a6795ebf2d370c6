//! Glyph subsetting of embedded TrueType fonts.
//!
//! Overlay text draws glyphs by id through an identity CID map, so glyph ids
//! must survive subsetting. Unused glyphs are emptied in `glyf` rather than
//! renumbered, and `loca` is rewritten in the long format. Other tables are
//! carried over unchanged, except the signature, which no longer holds.
//!
//! Subset fonts are named `TAG+BaseName` with a six-letter tag derived from
//! the kept glyphs, so the same subset always gets the same name.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use crate::error::{UnmarkError, UnmarkResult};

const COMPONENT_WORD_ARGS: u16 = 0x0001;
const COMPONENT_SCALE: u16 = 0x0008;
const COMPONENT_MORE: u16 = 0x0020;
const COMPONENT_XY_SCALE: u16 = 0x0040;
const COMPONENT_TWO_BY_TWO: u16 = 0x0080;

/// `head.checkSumAdjustment` target sum.
const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

/// Tracks the glyphs a subset must keep. `.notdef` is always kept.
#[derive(Debug, Clone)]
pub struct GlyphSet {
    glyphs: BTreeSet<u16>,
}

impl Default for GlyphSet {
    fn default() -> Self {
        Self {
            glyphs: BTreeSet::from([0]),
        }
    }
}

impl GlyphSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, glyph: u16) {
        self.glyphs.insert(glyph);
    }

    pub fn contains(&self, glyph: u16) -> bool {
        self.glyphs.contains(&glyph)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// Six uppercase letters identifying this set.
    pub fn tag(&self) -> String {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.glyphs.hash(&mut hasher);
        let mut h = hasher.finish();
        (0..6)
            .map(|_| {
                let c = (h % 26) as u8 + b'A';
                h /= 26;
                c as char
            })
            .collect()
    }

    /// `base` prefixed with this set's tag.
    pub fn subset_name(&self, base: &str) -> String {
        let base = base.split_once('+').map_or(base, |(_, rest)| rest);
        format!("{}+{}", self.tag(), base)
    }
}

#[derive(Debug, Clone)]
struct TableRecord {
    tag: [u8; 4],
    offset: usize,
    length: usize,
}

/// Returns a copy of the TrueType `font` keeping only the outlines of
/// `keep` and of the components they reference.
pub fn subset_truetype(font: &[u8], keep: &GlyphSet) -> UnmarkResult<Vec<u8>> {
    let tables = table_directory(font)?;
    let table = |tag: &[u8; 4]| -> UnmarkResult<&[u8]> {
        tables
            .iter()
            .find(|t| &t.tag == tag)
            .and_then(|t| font.get(t.offset..t.offset + t.length))
            .ok_or_else(|| malformed(format!("missing {} table", String::from_utf8_lossy(tag))))
    };

    let head = table(b"head")?;
    let long_loca = read_u16(head, 50)? != 0;
    let num_glyphs = usize::from(read_u16(table(b"maxp")?, 4)?);
    let loca = table(b"loca")?;
    let glyf = table(b"glyf")?;

    let offsets = (0..=num_glyphs)
        .map(|i| {
            if long_loca {
                read_u32(loca, i * 4).map(|v| v as usize)
            } else {
                read_u16(loca, i * 2).map(|v| usize::from(v) * 2)
            }
        })
        .collect::<UnmarkResult<Vec<usize>>>()?;
    let outline = |gid: usize| -> UnmarkResult<&[u8]> {
        let (start, end) = (offsets[gid], offsets[gid + 1]);
        if end < start {
            return Err(malformed(format!("glyph {} has a negative length", gid)));
        }
        glyf.get(start..end)
            .ok_or_else(|| malformed(format!("glyph {} lies outside glyf", gid)))
    };

    let mut kept = BTreeSet::new();
    let mut pending: Vec<u16> = keep.glyphs.iter().copied().collect();
    while let Some(gid) = pending.pop() {
        if usize::from(gid) >= num_glyphs || !kept.insert(gid) {
            continue;
        }
        pending.extend(components(outline(usize::from(gid))?)?);
    }

    let mut new_glyf = Vec::new();
    let mut new_loca = Vec::with_capacity((num_glyphs + 1) * 4);
    for gid in 0..num_glyphs {
        new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());
        if kept.contains(&(gid as u16)) {
            new_glyf.extend_from_slice(outline(gid)?);
            pad4(&mut new_glyf);
        }
    }
    new_loca.extend_from_slice(&(new_glyf.len() as u32).to_be_bytes());

    let mut new_head = head.to_vec();
    new_head[8..12].copy_from_slice(&[0; 4]);
    new_head[50..52].copy_from_slice(&1u16.to_be_bytes());

    let mut out_tables: Vec<([u8; 4], Vec<u8>)> = Vec::with_capacity(tables.len());
    for record in &tables {
        let data = match &record.tag {
            b"DSIG" => continue,
            b"glyf" => new_glyf.clone(),
            b"loca" => new_loca.clone(),
            b"head" => new_head.clone(),
            tag => table(tag)?.to_vec(),
        };
        out_tables.push((record.tag, data));
    }
    out_tables.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(write_font(&font[0..4], &out_tables))
}

/// Glyph ids referenced by a composite outline.
fn components(outline: &[u8]) -> UnmarkResult<Vec<u16>> {
    if outline.len() < 10 || (read_u16(outline, 0)? as i16) >= 0 {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    let mut pos = 10;
    loop {
        let flags = read_u16(outline, pos)?;
        found.push(read_u16(outline, pos + 2)?);
        pos += 4;
        pos += if flags & COMPONENT_WORD_ARGS != 0 { 4 } else { 2 };
        if flags & COMPONENT_SCALE != 0 {
            pos += 2;
        } else if flags & COMPONENT_XY_SCALE != 0 {
            pos += 4;
        } else if flags & COMPONENT_TWO_BY_TWO != 0 {
            pos += 8;
        }
        if flags & COMPONENT_MORE == 0 {
            return Ok(found);
        }
    }
}

fn table_directory(font: &[u8]) -> UnmarkResult<Vec<TableRecord>> {
    let count = usize::from(read_u16(font, 4)?);
    (0..count)
        .map(|i| {
            let at = 12 + i * 16;
            let tag = font
                .get(at..at + 4)
                .and_then(|t| <[u8; 4]>::try_from(t).ok())
                .ok_or_else(|| malformed("truncated table directory"))?;
            let record = TableRecord {
                tag,
                offset: read_u32(font, at + 8)? as usize,
                length: read_u32(font, at + 12)? as usize,
            };
            if record.offset.saturating_add(record.length) > font.len() {
                return Err(malformed(format!(
                    "table {} lies outside the file",
                    String::from_utf8_lossy(&tag)
                )));
            }
            Ok(record)
        })
        .collect()
}

fn write_font(version: &[u8], tables: &[([u8; 4], Vec<u8>)]) -> Vec<u8> {
    let count = tables.len() as u16;
    let entry_selector = 15 - count.max(1).leading_zeros() as u16;
    let search_range = (1u16 << entry_selector) * 16;
    let range_shift = count * 16 - search_range;

    let mut out = Vec::new();
    out.extend_from_slice(version);
    for v in [count, search_range, entry_selector, range_shift] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    let mut offset = 12 + tables.len() * 16;
    for (tag, data) in tables {
        out.extend_from_slice(tag);
        out.extend_from_slice(&checksum(data).to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        offset += (data.len() + 3) & !3;
    }
    let mut head_at = None;
    for (tag, data) in tables {
        if tag == b"head" {
            head_at = Some(out.len());
        }
        out.extend_from_slice(data);
        pad4(&mut out);
    }
    if let Some(at) = head_at {
        let adjustment = CHECKSUM_MAGIC.wrapping_sub(checksum(&out));
        out[at + 8..at + 12].copy_from_slice(&adjustment.to_be_bytes());
    }
    out
}

fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

fn pad4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

fn read_u16(data: &[u8], at: usize) -> UnmarkResult<u16> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| malformed(format!("truncated at offset {}", at)))
}

fn read_u32(data: &[u8], at: usize) -> UnmarkResult<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| malformed(format!("truncated at offset {}", at)))
}

fn malformed(message: impl Into<String>) -> UnmarkError {
    UnmarkError::toolkit("subset_fonts", message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A font with four glyphs; glyph 3 is a composite of glyph 1.
    fn tiny_font() -> Vec<u8> {
        let simple = |marker: u8| {
            let mut g = vec![0, 1, 0, 0, 0, 0, 0, 10, 0, 10];
            g.extend_from_slice(&[0, 0, 0, 0, marker, 0]);
            g
        };
        let composite = {
            let mut g = vec![0xFF, 0xFF, 0, 0, 0, 0, 0, 10, 0, 10];
            // flags: byte args, no more components; glyph 1
            g.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x00, 0x00]);
            g
        };
        let glyphs = [simple(0xA0), simple(0xA1), simple(0xA2), composite];
        let mut glyf = Vec::new();
        let mut loca = Vec::new();
        for g in &glyphs {
            loca.extend_from_slice(&(glyf.len() as u32).to_be_bytes());
            glyf.extend_from_slice(g);
            pad4(&mut glyf);
        }
        loca.extend_from_slice(&(glyf.len() as u32).to_be_bytes());

        let mut head = vec![0u8; 54];
        head[50..52].copy_from_slice(&1u16.to_be_bytes());
        let mut maxp = vec![0, 0, 0x50, 0];
        maxp.extend_from_slice(&4u16.to_be_bytes());
        write_font(
            &[0, 1, 0, 0],
            &[
                (*b"glyf", glyf),
                (*b"head", head),
                (*b"loca", loca),
                (*b"maxp", maxp),
            ],
        )
    }

    fn glyph_lengths(font: &[u8]) -> Vec<usize> {
        let tables = table_directory(font).unwrap();
        let loca = tables.iter().find(|t| &t.tag == b"loca").unwrap();
        let loca = &font[loca.offset..loca.offset + loca.length];
        let offsets: Vec<u32> = (0..5).map(|i| read_u32(loca, i * 4).unwrap()).collect();
        offsets.windows(2).map(|w| (w[1] - w[0]) as usize).collect()
    }

    #[test]
    fn test_unused_glyphs_are_emptied() {
        let font = tiny_font();
        let mut keep = GlyphSet::new();
        keep.insert(2);
        let subset = subset_truetype(&font, &keep).unwrap();
        assert_eq!(glyph_lengths(&subset), vec![16, 0, 16, 0]);
        assert!(subset.len() < font.len());
    }

    #[test]
    fn test_composite_keeps_its_components() {
        let mut keep = GlyphSet::new();
        keep.insert(3);
        let subset = subset_truetype(&tiny_font(), &keep).unwrap();
        assert_eq!(glyph_lengths(&subset), vec![16, 16, 0, 16]);
    }

    #[test]
    fn test_subset_checksum_adjustment() {
        let subset = subset_truetype(&tiny_font(), &GlyphSet::new()).unwrap();
        assert_eq!(checksum(&subset), CHECKSUM_MAGIC);
    }

    #[test]
    fn test_truncated_font_is_rejected() {
        let font = tiny_font();
        assert!(subset_truetype(&font[..40], &GlyphSet::new()).is_err());
    }

    #[test]
    fn test_subset_name_is_stable() {
        let mut set = GlyphSet::new();
        set.insert(36);
        let name = set.subset_name("DejaVuSans");
        assert_eq!(name.len(), "ABCDEF+DejaVuSans".len());
        assert!(name[..6].chars().all(|c| c.is_ascii_uppercase()));
        assert_eq!(set.subset_name(&name), name);
    }
}
