
use anyhow::Result;

use super::Embedder;

/// Default vector length of the built-in n-gram embedder
pub const DEFAULT_NGRAM_DIMENSION: u32 = 384;

const NGRAM_SIZE: usize = 3;
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Offline embedder hashing lowercase character trigrams of each word into a fixed number
/// of buckets. The output is L2-normalised, so texts sharing vocabulary score high under
/// cosine similarity.
#[derive(Debug, Clone)]
pub struct NgramEmbedder {
    dimension: usize,
}

impl NgramEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, gram: &[char]) -> usize {
        let mut hash = FNV_OFFSET_BASIS;
        for c in gram {
            let mut buf = [0; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        }
        (hash % self.dimension as u64) as usize
    }
}

impl Default for NgramEmbedder {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_NGRAM_DIMENSION as usize)
    }
}

impl Embedder for NgramEmbedder {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            // Pad so short words and word edges still produce grams
            let padded: Vec<char> = std::iter::once('^')
                .chain(word.chars().flat_map(char::to_lowercase))
                .chain(std::iter::once('$'))
                .collect();

            for gram in padded.windows(NGRAM_SIZE.min(padded.len())) {
                vector[self.bucket(gram)] += 1.0;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }

        Ok(vector)
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn name(&self) -> &str {
        "ngram"
    }
}
