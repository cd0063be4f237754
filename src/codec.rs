//! The portable roaring serialization format, shared by the C, Java and Go
//! roaring libraries. All integers are little endian.
//!
//! ```text
//! header    u32 cookie 12346, u32 container count      (no run containers)
//!           u32 12347 | (count - 1) << 16, run flags   (with run containers)
//! keys      count * (u16 key, u16 cardinality - 1)
//! offsets   count * u32 payload offset                 (omitted when there are
//!                                                       run containers and
//!                                                       count < 4)
//! payloads  run:    u16 run count, (u16 start, u16 length) per run
//!           bitmap: 1024 * u64, for cardinality > 4096
//!           array:  cardinality * u16
//! ```
//!
//! Decoding is strict: anything that does not exactly describe a valid set is
//! rejected without producing a partial result.

use crate::container::{
    push_run, Container, Kind, Lows, ARRAY_MAX_SIZE, BITMAP_BYTES, BITMAP_WORDS,
};
use crate::error::Error;
use crate::set::RoaringSet;
use bytes::{Buf, BufMut};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserializer, Serializer};
use serde_derive::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

const SERIAL_COOKIE_NO_RUNCONTAINER: u32 = 12346;
const SERIAL_COOKIE: u32 = 12347;
/// With run containers and fewer than this many containers, the offset table is
/// omitted.
const NO_OFFSET_THRESHOLD: usize = 4;
/// One container per 16 bit key.
const MAX_CONTAINERS: usize = 1 << 16;

/// Limits applied when decoding untrusted input.
///
/// # Examples
/// ```
/// use roarset::{DecodeConfig, Error, RoaringSet};
///
/// let set: RoaringSet = vec![1, 70000, 140000].into_iter().collect();
/// let bytes = set.serialize();
///
/// let config = DecodeConfig::new(2);
/// assert_eq!(
///     RoaringSet::deserialize_with(&bytes, &config),
///     Err(Error::LimitExceeded(3, 2))
/// );
/// ```
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DecodeConfig {
    /// The largest number of containers a decoded set may hold.
    pub max_containers: usize,
}

impl DecodeConfig {
    pub fn new(max_containers: usize) -> Self {
        DecodeConfig { max_containers }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        DecodeConfig {
            max_containers: MAX_CONTAINERS,
        }
    }
}

#[inline(always)]
fn has_offsets(has_runs: bool, count: usize) -> bool {
    !has_runs || count >= NO_OFFSET_THRESHOLD
}

/// Bytes before the first payload.
fn header_size(has_runs: bool, count: usize) -> usize {
    let cookie = if has_runs { 4 + (count + 7) / 8 } else { 8 };
    let offsets = if has_offsets(has_runs, count) {
        4 * count
    } else {
        0
    };
    cookie + 4 * count + offsets
}

fn payload_size(kind: Kind, card: usize, nruns: usize) -> usize {
    match kind {
        Kind::Array => 2 * card,
        Kind::Bitmap => BITMAP_BYTES,
        Kind::Run => 2 + 4 * nruns,
    }
}

fn container_payload_size(con: &Container) -> usize {
    payload_size(con.kind(), con.cardinality(), con.num_runs())
}

fn write_payload<B: BufMut>(con: &Container, buf: &mut B) {
    match con {
        Container::Array(arr) => arr.iter().for_each(|v| buf.put_u16_le(*v)),
        Container::Bitmap(words) => words.iter().for_each(|w| buf.put_u64_le(*w)),
        Container::Run(runs) => {
            buf.put_u16_le(runs.len() as u16);
            runs.iter().for_each(|r| {
                buf.put_u16_le(r.start);
                buf.put_u16_le(r.length);
            });
        }
    }
}

fn malformed(reason: &'static str) -> Error {
    debug!(reason, "rejected malformed roaring input");
    Error::MalformedInput(reason)
}

#[inline(always)]
fn ensure(buf: &[u8], len: usize, reason: &'static str) -> Result<(), Error> {
    if buf.remaining() < len {
        Err(malformed(reason))
    } else {
        Ok(())
    }
}

fn read_array(buf: &mut &[u8], card: usize) -> Result<Container, Error> {
    ensure(buf, 2 * card, "truncated array container")?;
    let mut lows = Lows::with_capacity(card);
    for _ in 0..card {
        let low = buf.get_u16_le();
        if lows.last().map(|last| low <= *last).unwrap_or(false) {
            return Err(malformed("array values are not strictly ascending"));
        }
        lows.push(low);
    }
    Ok(Container::Array(lows))
}

fn read_bitmap(buf: &mut &[u8], card: usize) -> Result<Container, Error> {
    ensure(buf, BITMAP_BYTES, "truncated bitmap container")?;
    let mut words = Box::new([0u64; BITMAP_WORDS]);
    words.iter_mut().for_each(|w| *w = buf.get_u64_le());
    let popcount: usize = words.iter().map(|w| w.count_ones() as usize).sum();
    if popcount != card {
        return Err(malformed("bitmap population does not match cardinality"));
    }
    Ok(Container::Bitmap(words))
}

fn read_runs(buf: &mut &[u8], card: usize) -> Result<Container, Error> {
    ensure(buf, 2, "truncated run container")?;
    let nruns = buf.get_u16_le() as usize;
    ensure(buf, 4 * nruns, "truncated run container")?;

    let mut runs = Vec::with_capacity(nruns);
    let mut prev_end: Option<u32> = None;
    let mut total = 0;
    for _ in 0..nruns {
        let start = buf.get_u16_le();
        let length = buf.get_u16_le();
        let end = start as u32 + length as u32;
        if end > u16::MAX as u32 {
            return Err(malformed("run extends past the container"));
        }
        if prev_end.map(|prev| start as u32 <= prev).unwrap_or(false) {
            return Err(malformed("runs overlap or are out of order"));
        }
        prev_end = Some(end);
        total += length as usize + 1;
        push_run(&mut runs, start, end as u16);
    }
    if total != card {
        return Err(malformed("run lengths do not match cardinality"));
    }

    let mut con = Container::Run(runs);
    con.normalize();
    Ok(con)
}

impl RoaringSet {
    /// The exact number of bytes `serialize` produces for this set.
    pub fn serialized_size(&self) -> usize {
        let mut has_runs = false;
        let payloads: usize = self
            .containers()
            .iter()
            .map(|(_, con)| {
                let kind = con.best_kind();
                has_runs |= kind == Kind::Run;
                payload_size(kind, con.cardinality(), con.num_runs())
            })
            .sum();
        header_size(has_runs, self.containers().len()) + payloads
    }

    /// Serialize this set into the portable roaring format. Containers are
    /// written in their smallest representation, without modifying the set.
    ///
    /// # Examples
    /// ```
    /// use roarset::RoaringSet;
    ///
    /// let set: RoaringSet = vec![1, 2, 3, 100000].into_iter().collect();
    /// let bytes = set.serialize();
    /// assert_eq!(bytes.len(), 32);
    /// assert_eq!(RoaringSet::deserialize(&bytes), Ok(set));
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.serialize_into(&mut buf);
        buf
    }

    /// Serialize this set into the portable roaring format, appending to `buf`.
    pub fn serialize_into<B: BufMut>(&self, buf: &mut B) {
        let views: Vec<(u16, Cow<'_, Container>)> = self
            .containers()
            .iter()
            .map(|(key, con)| (*key, con.optimized()))
            .collect();
        let count = views.len();
        let has_runs = views.iter().any(|(_, con)| con.kind() == Kind::Run);

        if has_runs {
            buf.put_u32_le(SERIAL_COOKIE | (((count - 1) as u32) << 16));
            let mut flags = vec![0u8; (count + 7) / 8];
            views
                .iter()
                .enumerate()
                .filter(|(_, (_, con))| con.kind() == Kind::Run)
                .for_each(|(i, _)| flags[i / 8] |= 1 << (i % 8));
            buf.put_slice(&flags);
        } else {
            buf.put_u32_le(SERIAL_COOKIE_NO_RUNCONTAINER);
            buf.put_u32_le(count as u32);
        }

        for (key, con) in views.iter() {
            buf.put_u16_le(*key);
            buf.put_u16_le((con.cardinality() - 1) as u16);
        }

        if has_offsets(has_runs, count) {
            let mut offset = header_size(has_runs, count);
            for (_, con) in views.iter() {
                buf.put_u32_le(offset as u32);
                offset += container_payload_size(con);
            }
        }

        for (_, con) in views.iter() {
            write_payload(con, buf);
        }
    }

    /// Decode a set from the portable roaring format with the default limits.
    pub fn deserialize(input: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with(input, &DecodeConfig::default())
    }

    /// Decode a set from the portable roaring format. The input must hold exactly
    /// one serialized set.
    pub fn deserialize_with(input: &[u8], config: &DecodeConfig) -> Result<Self, Error> {
        let mut buf = input;

        ensure(buf, 4, "truncated header")?;
        let cookie = buf.get_u32_le();
        let (count, run_flags) = if cookie & 0xFFFF == SERIAL_COOKIE {
            let count = (cookie >> 16) as usize + 1;
            let flag_bytes = (count + 7) / 8;
            ensure(buf, flag_bytes, "truncated run flags")?;
            let (flags, rest) = buf.split_at(flag_bytes);
            buf = rest;
            (count, Some(flags))
        } else if cookie == SERIAL_COOKIE_NO_RUNCONTAINER {
            ensure(buf, 4, "truncated header")?;
            (buf.get_u32_le() as usize, None)
        } else {
            return Err(malformed("unknown cookie"));
        };

        if count > MAX_CONTAINERS {
            return Err(malformed("more containers than keys"));
        }
        if count > config.max_containers {
            debug!(
                count,
                max = config.max_containers,
                "rejected roaring input over container limit"
            );
            return Err(Error::LimitExceeded(count, config.max_containers));
        }

        ensure(buf, 4 * count, "truncated key table")?;
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            let key = buf.get_u16_le();
            let card = buf.get_u16_le() as usize + 1;
            if keys.last().map(|(last, _)| key <= *last).unwrap_or(false) {
                return Err(malformed("keys are not strictly ascending"));
            }
            keys.push((key, card));
        }

        let offsets = if has_offsets(run_flags.is_some(), count) {
            ensure(buf, 4 * count, "truncated offset table")?;
            Some((0..count).map(|_| buf.get_u32_le()).collect::<Vec<_>>())
        } else {
            None
        };

        let mut containers = Vec::with_capacity(count);
        for (i, (key, card)) in keys.into_iter().enumerate() {
            if let Some(offsets) = &offsets {
                let position = input.len() - buf.remaining();
                if offsets[i] as usize != position {
                    return Err(malformed("offset does not match payload position"));
                }
            }
            let is_run = run_flags
                .map(|flags| flags[i / 8] & (1 << (i % 8)) != 0)
                .unwrap_or(false);
            let con = if is_run {
                read_runs(&mut buf, card)?
            } else if card > ARRAY_MAX_SIZE {
                read_bitmap(&mut buf, card)?
            } else {
                read_array(&mut buf, card)?
            };
            containers.push((key, con));
        }

        if buf.has_remaining() {
            return Err(malformed("trailing bytes after set"));
        }

        let set = RoaringSet::from_containers(containers);
        debug!(
            containers = set.num_containers(),
            cardinality = set.cardinality(),
            "decoded roaring set"
        );
        Ok(set)
    }
}

impl serde::Serialize for RoaringSet {
    /// Serialized as the portable roaring bytes.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&RoaringSet::serialize(self))
    }
}

impl<'de> serde::Deserialize<'de> for RoaringSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_bytes(RoaringSetVisitor)
    }
}

struct RoaringSetVisitor;

impl<'de> Visitor<'de> for RoaringSetVisitor {
    type Value = RoaringSet;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("portable roaring bitmap bytes")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<RoaringSet, E>
    where
        E: de::Error,
    {
        RoaringSet::deserialize(v).map_err(E::custom)
    }

    // Formats without native bytes, such as JSON, give a sequence of u8.
    fn visit_seq<A>(self, mut seq: A) -> Result<RoaringSet, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(BITMAP_BYTES));
        while let Some(b) = seq.next_element::<u8>()? {
            bytes.push(b);
        }
        RoaringSet::deserialize(&bytes).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::DecodeConfig;
    use crate::container::Kind;
    use crate::{Error, RoaringSet};
    use bytes::BufMut;
    use std::iter::FromIterator;

    const GOLDEN: [u8; 32] = [
        0x3a, 0x30, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00,
        0x00, 0x18, 0x00, 0x00, 0x00, 0x1e, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03, 0x00,
        0xa0, 0x86,
    ];

    const GOLDEN_RUN: [u8; 15] = [
        0x3b, 0x30, 0x00, 0x00, 0x01, 0x00, 0x00, 0x09, 0x00, 0x01, 0x00, 0x00, 0x00, 0x09, 0x00,
    ];

    fn malformed(bytes: &[u8]) -> bool {
        matches!(
            RoaringSet::deserialize(bytes),
            Err(Error::MalformedInput(_))
        )
    }

    fn round_trip(set: &RoaringSet) {
        let bytes = set.serialize();
        assert_eq!(bytes.len(), set.serialized_size());
        let decoded = RoaringSet::deserialize(&bytes).unwrap();
        assert_eq!(&decoded, set);
        assert!(decoded.iter().eq(set.iter()));
        assert_eq!(decoded.serialize(), bytes);
    }

    #[test]
    fn test_golden_bytes() {
        let set = RoaringSet::from_iter(vec![1, 2, 3, 100000]);
        assert_eq!(set.serialize(), GOLDEN.to_vec());
        assert_eq!(set.serialized_size(), 32);
        assert_eq!(RoaringSet::deserialize(&GOLDEN).unwrap(), set);
    }

    #[test]
    fn test_golden_run_bytes() {
        let set = RoaringSet::from_iter(0..10);
        assert_eq!(set.serialize(), GOLDEN_RUN.to_vec());
        assert_eq!(set.serialized_size(), 15);
        let decoded = RoaringSet::deserialize(&GOLDEN_RUN).unwrap();
        assert!(decoded.iter().eq(0..10));
    }

    #[test]
    fn test_serialize_does_not_mutate() {
        let set = RoaringSet::from_iter(0..10);
        let _ = set.serialize();
        assert_eq!(set.containers()[0].1.kind(), Kind::Array);
    }

    #[test]
    fn test_round_trips() {
        round_trip(&RoaringSet::new());
        round_trip(&RoaringSet::from_iter(vec![42]));
        round_trip(&RoaringSet::from_iter(0..100_000));
        round_trip(&RoaringSet::from_iter(vec![1, 70000, u32::MAX]));
        round_trip(&RoaringSet::from_iter((0..300_000).step_by(2)));
        round_trip(&RoaringSet::from_iter(
            (0..5000).chain((70_000..90_000).step_by(3)).chain(vec![u32::MAX]),
        ));
    }

    #[test]
    fn test_round_trip_many_containers_with_runs() {
        // Run containers with at least four containers carry the offset table.
        let mut set = RoaringSet::new();
        for key in 0..6u32 {
            set.add_range((key << 16)..((key << 16) + 100));
        }
        let bytes = set.serialize();
        assert_eq!(bytes[0..2], [0x3b, 0x30]);
        round_trip(&set);
    }

    #[test]
    fn test_empty_set_bytes() {
        let bytes = RoaringSet::new().serialize();
        assert_eq!(bytes, vec![0x3a, 0x30, 0, 0, 0, 0, 0, 0]);
        assert!(RoaringSet::deserialize(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_optimize_idempotent_bytes() {
        let mut set = RoaringSet::from_iter((0..70_000).chain((100_000..120_000).step_by(5)));
        let before = set.serialize();
        set.optimize();
        assert_eq!(set.serialize(), before);
        set.optimize();
        assert_eq!(set.serialize(), before);
    }

    #[test]
    fn test_serialize_into_appends() {
        let set = RoaringSet::from_iter(vec![1, 2, 3, 100000]);
        let mut buf = vec![0xffu8];
        set.serialize_into(&mut buf);
        assert_eq!(buf.len(), 33);
        assert_eq!(&buf[1..], &GOLDEN[..]);
    }

    #[test]
    fn test_reject_truncated_and_trailing() {
        assert!(malformed(&[]));
        assert!(malformed(&GOLDEN[..3]));
        for len in 0..GOLDEN.len() {
            assert!(malformed(&GOLDEN[..len]));
        }
        let mut trailing = GOLDEN.to_vec();
        trailing.push(0);
        assert!(malformed(&trailing));
        for len in 0..GOLDEN_RUN.len() {
            assert!(malformed(&GOLDEN_RUN[..len]));
        }
    }

    #[test]
    fn test_reject_unknown_cookie() {
        assert_eq!(
            RoaringSet::deserialize(&[0, 0, 0, 0, 0, 0, 0, 0]),
            Err(Error::MalformedInput("unknown cookie"))
        );
        let mut bytes = GOLDEN.to_vec();
        bytes[2] = 1;
        assert!(malformed(&bytes));
    }

    #[test]
    fn test_reject_unsorted_keys() {
        let mut bytes = Vec::new();
        bytes.put_u32_le(12346);
        bytes.put_u32_le(2);
        bytes.put_u16_le(5);
        bytes.put_u16_le(0);
        bytes.put_u16_le(5);
        bytes.put_u16_le(0);
        bytes.put_u32_le(24);
        bytes.put_u32_le(26);
        bytes.put_u16_le(1);
        bytes.put_u16_le(2);
        assert_eq!(
            RoaringSet::deserialize(&bytes),
            Err(Error::MalformedInput("keys are not strictly ascending"))
        );
    }

    #[test]
    fn test_reject_bad_offset() {
        let mut bytes = GOLDEN.to_vec();
        bytes[16] = 0x19;
        assert_eq!(
            RoaringSet::deserialize(&bytes),
            Err(Error::MalformedInput(
                "offset does not match payload position"
            ))
        );
    }

    #[test]
    fn test_reject_unsorted_array() {
        let mut bytes = GOLDEN.to_vec();
        // Values 1, 3, 2.
        bytes[26] = 0x03;
        bytes[28] = 0x02;
        assert_eq!(
            RoaringSet::deserialize(&bytes),
            Err(Error::MalformedInput(
                "array values are not strictly ascending"
            ))
        );
    }

    #[test]
    fn test_reject_bitmap_popcount() {
        let mut bytes = Vec::new();
        bytes.put_u32_le(12346);
        bytes.put_u32_le(1);
        bytes.put_u16_le(0);
        bytes.put_u16_le(4096);
        bytes.put_u32_le(16);
        bytes.put_bytes(0, 8192);
        assert_eq!(
            RoaringSet::deserialize(&bytes),
            Err(Error::MalformedInput(
                "bitmap population does not match cardinality"
            ))
        );

        // Fixing the population makes it valid.
        let mut valid = bytes.clone();
        (16..16 + 4097 / 8).for_each(|i| valid[i] = 0xff);
        valid[16 + 4097 / 8] = 0x01;
        let set = RoaringSet::deserialize(&valid).unwrap();
        assert_eq!(set.cardinality(), 4097);
    }

    fn run_bytes(card: u16, runs: &[(u16, u16)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.put_u32_le(12347);
        bytes.put_u8(1);
        bytes.put_u16_le(0);
        bytes.put_u16_le(card - 1);
        bytes.put_u16_le(runs.len() as u16);
        for (start, length) in runs {
            bytes.put_u16_le(*start);
            bytes.put_u16_le(*length);
        }
        bytes
    }

    #[test]
    fn test_reject_bad_runs() {
        assert_eq!(run_bytes(10, &[(0, 9)]), GOLDEN_RUN.to_vec());
        assert_eq!(
            RoaringSet::deserialize(&run_bytes(10, &[(65530, 9)])),
            Err(Error::MalformedInput("run extends past the container"))
        );
        assert_eq!(
            RoaringSet::deserialize(&run_bytes(10, &[(0, 4), (3, 4)])),
            Err(Error::MalformedInput("runs overlap or are out of order"))
        );
        assert_eq!(
            RoaringSet::deserialize(&run_bytes(10, &[(10, 4), (0, 4)])),
            Err(Error::MalformedInput("runs overlap or are out of order"))
        );
        assert_eq!(
            RoaringSet::deserialize(&run_bytes(9, &[(0, 9)])),
            Err(Error::MalformedInput("run lengths do not match cardinality"))
        );
        assert!(malformed(&run_bytes(1, &[])));
    }

    #[test]
    fn test_decoded_runs_are_normalised() {
        // Adjacent runs coalesce, and a run list that is not the smallest form
        // is stored as an array.
        let set = RoaringSet::deserialize(&run_bytes(10, &[(0, 4), (5, 4)])).unwrap();
        assert!(set.iter().eq(0..10));
        assert_eq!(set.containers()[0].1.kind(), Kind::Run);

        let set = RoaringSet::deserialize(&run_bytes(2, &[(0, 0), (2, 0)])).unwrap();
        assert_eq!(set.containers()[0].1.kind(), Kind::Array);
        assert!(set.iter().eq(vec![0, 2]));
    }

    #[test]
    fn test_reject_too_many_containers() {
        let mut bytes = Vec::new();
        bytes.put_u32_le(12346);
        bytes.put_u32_le(65537);
        assert_eq!(
            RoaringSet::deserialize(&bytes),
            Err(Error::MalformedInput("more containers than keys"))
        );
    }

    #[test]
    fn test_limit_exceeded() {
        let set = RoaringSet::from_iter(vec![1, 70000, 140000]);
        let bytes = set.serialize();
        assert_eq!(
            RoaringSet::deserialize_with(&bytes, &DecodeConfig::new(2)),
            Err(Error::LimitExceeded(3, 2))
        );
        assert_eq!(
            RoaringSet::deserialize_with(&bytes, &DecodeConfig::new(3)),
            Ok(set)
        );
    }

    #[test]
    fn test_serde_json_round_trip() {
        let set = RoaringSet::from_iter(vec![1, 2, 3, 100000]);
        let json = serde_json::to_string(&set).unwrap();
        let decoded: RoaringSet = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, set);

        assert!(serde_json::from_str::<RoaringSet>("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_decode_config_serde() {
        let config: DecodeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DecodeConfig::default());
        assert_eq!(config.max_containers, 65536);

        let config: DecodeConfig = serde_json::from_str(r#"{"max_containers": 16}"#).unwrap();
        assert_eq!(config, DecodeConfig::new(16));
    }
}
