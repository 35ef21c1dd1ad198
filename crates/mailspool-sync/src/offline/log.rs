//! Binary job-log records.
//!
//! One record per job: a one-byte type tag followed by the job's
//! fields. Strings are u32-length-prefixed raw bytes, numbers are
//! little-endian, a flag set is its system bits followed by a keyword
//! list. Decoding is strict; the first record that does not parse
//! cleanly ends the log.

use bytes::{Buf, BufMut, BytesMut};
use mailspool_imap::{Flag, Flags};

use super::job::{CopyEntry, OfflineJob};

const TAG_APPEND: u8 = 1;
const TAG_COPY: u8 = 2;
const TAG_SET_FLAGS: u8 = 4;
const TAG_SET_LABEL: u8 = 5;

pub(super) fn encode(job: &OfflineJob, buf: &mut BytesMut) {
    match job {
        OfflineJob::Append { folder, id } => {
            buf.put_u8(TAG_APPEND);
            put_string(buf, folder);
            buf.put_u32_le(*id);
        }
        OfflineJob::Copy {
            from,
            to,
            entries,
            move_messages,
        } => {
            buf.put_u8(TAG_COPY);
            put_string(buf, from);
            put_string(buf, to);
            buf.put_u8(u8::from(*move_messages));
            put_len(buf, entries.len());
            for entry in entries {
                buf.put_u32_le(entry.uid);
                buf.put_u32_le(entry.id);
                put_flags(buf, &entry.flags);
            }
        }
        OfflineJob::SetFlags {
            folder,
            uids,
            flags,
            mask,
        } => {
            buf.put_u8(TAG_SET_FLAGS);
            put_string(buf, folder);
            put_uids(buf, uids);
            put_flags(buf, flags);
            put_flags(buf, mask);
        }
        OfflineJob::SetLabel {
            folder,
            uids,
            labels,
            mask,
        } => {
            buf.put_u8(TAG_SET_LABEL);
            put_string(buf, folder);
            put_uids(buf, uids);
            put_flags(buf, labels);
            put_flags(buf, mask);
        }
    }
}

pub(super) fn decode(buf: &mut impl Buf) -> Option<OfflineJob> {
    match get_u8(buf)? {
        TAG_APPEND => {
            let folder = get_string(buf)?;
            let id = get_u32(buf)?;
            Some(OfflineJob::Append { folder, id })
        }
        TAG_COPY => {
            let from = get_string(buf)?;
            let to = get_string(buf)?;
            let move_messages = match get_u8(buf)? {
                0 => false,
                1 => true,
                _ => return None,
            };
            let count = get_len(buf)?;
            if count == 0 || count > buf.remaining() {
                return None;
            }
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let uid = get_u32(buf)?;
                let id = get_u32(buf)?;
                let flags = get_flags(buf)?;
                entries.push(CopyEntry { uid, id, flags });
            }
            Some(OfflineJob::Copy {
                from,
                to,
                entries,
                move_messages,
            })
        }
        TAG_SET_FLAGS => {
            let folder = get_string(buf)?;
            let uids = get_uids(buf)?;
            let flags = get_flags(buf)?;
            let mask = get_flags(buf)?;
            Some(OfflineJob::SetFlags {
                folder,
                uids,
                flags,
                mask,
            })
        }
        TAG_SET_LABEL => {
            let folder = get_string(buf)?;
            let uids = get_uids(buf)?;
            let labels = get_flags(buf)?;
            let mask = get_flags(buf)?;
            Some(OfflineJob::SetLabel {
                folder,
                uids,
                labels,
                mask,
            })
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn put_len(buf: &mut BytesMut, len: usize) {
    buf.put_u32_le(len as u32);
}

fn put_string(buf: &mut BytesMut, s: &str) {
    put_len(buf, s.len());
    buf.put_slice(s.as_bytes());
}

fn put_uids(buf: &mut BytesMut, uids: &[u32]) {
    put_len(buf, uids.len());
    for uid in uids {
        buf.put_u32_le(*uid);
    }
}

fn put_flags(buf: &mut BytesMut, flags: &Flags) {
    buf.put_u32_le(flags.bits());
    put_len(buf, flags.custom().len());
    for keyword in flags.custom() {
        put_string(buf, keyword);
    }
}

fn get_u8(buf: &mut impl Buf) -> Option<u8> {
    (buf.remaining() >= 1).then(|| buf.get_u8())
}

fn get_u32(buf: &mut impl Buf) -> Option<u32> {
    (buf.remaining() >= 4).then(|| buf.get_u32_le())
}

fn get_len(buf: &mut impl Buf) -> Option<usize> {
    usize::try_from(get_u32(buf)?).ok()
}

fn get_string(buf: &mut impl Buf) -> Option<String> {
    let len = get_len(buf)?;
    if buf.remaining() < len {
        return None;
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    String::from_utf8(raw).ok()
}

fn get_uids(buf: &mut impl Buf) -> Option<Vec<u32>> {
    let count = get_len(buf)?;
    if count == 0 || count > buf.remaining() {
        return None;
    }
    let mut uids = Vec::with_capacity(count);
    for _ in 0..count {
        uids.push(get_u32(buf)?);
    }
    Some(uids)
}

fn get_flags(buf: &mut impl Buf) -> Option<Flags> {
    let mut flags = Flags::from_bits(get_u32(buf)?);
    let count = get_len(buf)?;
    if count > buf.remaining() {
        return None;
    }
    for _ in 0..count {
        flags.insert(Flag::Keyword(get_string(buf)?));
    }
    Some(flags)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn round_trip(job: &OfflineJob) -> OfflineJob {
        let mut buf = BytesMut::new();
        encode(job, &mut buf);
        let mut bytes: &[u8] = &buf;
        let decoded = decode(&mut bytes).unwrap();
        assert!(bytes.is_empty(), "decode left {} bytes", bytes.len());
        decoded
    }

    #[test]
    fn test_append_round_trip() {
        let job = OfflineJob::append("Sent/2024", 42);
        assert_eq!(round_trip(&job), job);
    }

    #[test]
    fn test_copy_round_trip() {
        let mut flags = Flags::from_bits(Flags::SEEN | Flags::ANSWERED);
        flags.insert(Flag::Keyword("$work".to_string()));
        let job = OfflineJob::copy(
            "INBOX",
            "Archive",
            vec![
                CopyEntry {
                    uid: 9,
                    id: 109,
                    flags,
                },
                CopyEntry {
                    uid: 12,
                    id: 112,
                    flags: Flags::new(),
                },
            ],
            true,
        );
        assert_eq!(round_trip(&job), job);
    }

    #[test]
    fn test_set_flags_round_trip() {
        let job = OfflineJob::set_flags(
            "INBOX",
            vec![3, 4, 5],
            Flags::from_bits(Flags::SEEN),
            Flags::from_bits(Flags::SEEN | Flags::FLAGGED),
        );
        assert_eq!(round_trip(&job), job);
    }

    #[test]
    fn test_set_label_round_trip() {
        let labels = Flags::with_custom(0, vec!["$p1".to_string(), "$p2".to_string()]);
        let job = OfflineJob::set_label("INBOX", vec![7], labels.clone(), labels);
        assert_eq!(round_trip(&job), job);
    }

    #[test]
    fn test_unknown_tag_ends_the_log() {
        let mut bytes: &[u8] = &[3, 0, 0, 0, 0];
        assert_eq!(decode(&mut bytes), None);
    }

    #[test]
    fn test_truncated_record_ends_the_log() {
        let mut buf = BytesMut::new();
        encode(&OfflineJob::append("Sent", 1), &mut buf);
        let cut = buf.len() - 2;
        let mut bytes: &[u8] = &buf[..cut];
        assert_eq!(decode(&mut bytes), None);
    }

    #[test]
    fn test_empty_uid_list_is_invalid() {
        let mut buf = BytesMut::new();
        buf.put_u8(4);
        put_string(&mut buf, "INBOX");
        put_len(&mut buf, 0);
        let mut bytes: &[u8] = &buf;
        assert_eq!(decode(&mut bytes), None);
    }

    #[test]
    fn test_non_utf8_folder_is_invalid() {
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        put_len(&mut buf, 2);
        buf.put_slice(&[0xff, 0xfe]);
        buf.put_u32_le(7);
        let mut bytes: &[u8] = &buf;
        assert_eq!(decode(&mut bytes), None);
    }

    proptest! {
        /// Any queue of jobs survives an encode/decode cycle record
        /// by record.
        #[test]
        fn records_round_trip(
            ids in proptest::collection::vec(1u32..10_000, 1..8),
            bits in 0u32..32,
            move_messages in proptest::bool::ANY,
        ) {
            let flags = Flags::from_bits(bits);
            let jobs = vec![
                OfflineJob::append("Sent", ids[0]),
                OfflineJob::set_flags("INBOX", ids.clone(), flags.clone(), flags.clone()),
                OfflineJob::copy(
                    "INBOX",
                    "Archive",
                    ids.iter()
                        .map(|&uid| CopyEntry { uid, id: uid + 1, flags: flags.clone() })
                        .collect(),
                    move_messages,
                ),
            ];
            let mut buf = BytesMut::new();
            for job in &jobs {
                encode(job, &mut buf);
            }
            let mut bytes: &[u8] = &buf;
            let mut decoded = Vec::new();
            while !bytes.is_empty() {
                decoded.push(decode(&mut bytes).unwrap());
            }
            prop_assert_eq!(decoded, jobs);
        }
    }
}
