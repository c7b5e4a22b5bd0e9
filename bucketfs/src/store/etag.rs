use md5::{Digest, Md5};

/// Part size used when an upload is split into multipart chunks.
pub const MULTIPART_PART_SIZE: usize = 5 * 1024 * 1024;

/// Incremental etag computation.
///
/// A single-part etag is the hex MD5 of the content. A multipart etag is
/// the hex MD5 of the concatenated part digests followed by `-<parts>`.
#[derive(Debug, Clone)]
pub struct EtagHasher {
    part_size: usize,
    whole: Md5,
    part: Md5,
    part_len: usize,
    part_digests: Vec<u8>,
    parts: usize,
}

impl Default for EtagHasher {
    fn default() -> Self {
        Self::new(MULTIPART_PART_SIZE)
    }
}

impl EtagHasher {
    pub fn new(part_size: usize) -> Self {
        Self {
            part_size: part_size.max(1),
            whole: Md5::new(),
            part: Md5::new(),
            part_len: 0,
            part_digests: Vec::new(),
            parts: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.whole.update(data);
        while !data.is_empty() {
            let take = (self.part_size - self.part_len).min(data.len());
            self.part.update(&data[..take]);
            self.part_len += take;
            data = &data[take..];
            if self.part_len == self.part_size {
                self.close_part();
            }
        }
    }

    fn close_part(&mut self) {
        let digest = self.part.finalize_reset();
        self.part_digests.extend_from_slice(digest.as_slice());
        self.parts += 1;
        self.part_len = 0;
    }

    pub fn finish(mut self, multipart: bool) -> String {
        if !multipart {
            return faster_hex::hex_string(self.whole.finalize().as_slice());
        }
        if self.part_len > 0 || self.parts == 0 {
            self.close_part();
        }
        let digest = Md5::digest(&self.part_digests);
        format!("{}-{}", faster_hex::hex_string(digest.as_slice()), self.parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_etag_is_md5() {
        let mut hasher = EtagHasher::default();
        hasher.update(b"hello world");
        assert_eq!(hasher.finish(false), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_multipart_etag_counts_parts() {
        let mut hasher = EtagHasher::new(4);
        hasher.update(b"abcdefghij");
        let etag = hasher.finish(true);
        assert!(etag.ends_with("-3"), "{}", etag);

        let mut expected = Vec::new();
        for part in [&b"abcd"[..], b"efgh", b"ij"] {
            expected.extend_from_slice(Md5::digest(part).as_slice());
        }
        let expected = faster_hex::hex_string(Md5::digest(&expected).as_slice());
        assert_eq!(etag, format!("{}-3", expected));
    }

    #[test]
    fn test_split_updates_match_single_update() {
        let mut a = EtagHasher::new(3);
        a.update(b"abcdefg");
        let mut b = EtagHasher::new(3);
        b.update(b"ab");
        b.update(b"cdef");
        b.update(b"g");
        assert_eq!(a.finish(true), b.finish(true));
    }

    #[test]
    fn test_empty_multipart_has_one_part() {
        assert!(EtagHasher::default().finish(true).ends_with("-1"));
    }
}
