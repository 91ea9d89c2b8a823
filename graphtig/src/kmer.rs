//! Fixed length words on the nucleotide alphabet.
use crate::error::{AssemblyError, Result};
use crate::seq::{is_acgt, revcmp};

/// An immutable k-mer. Two k-mers are equal if and only if their bases are identical;
/// the strand-independent identity is [Kmer::minimal].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Kmer(Vec<u8>);

impl std::fmt::Display for Kmer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl Kmer {
    /// Create a k-mer. It fails if the word is empty or contains anything other than A,C,G,T.
    pub fn new(bases: &[u8]) -> Result<Self> {
        if bases.is_empty() {
            return Err(AssemblyError::InvalidKmerSize(0));
        }
        match bases.iter().position(|&b| !is_acgt(b)) {
            Some(position) => Err(AssemblyError::InvalidBase {
                base: bases[position] as char,
                position,
            }),
            None => Ok(Self(bases.iter().map(u8::to_ascii_uppercase).collect())),
        }
    }
    // The caller guarantees that `bases` is a non-empty uppercase ACGT word.
    pub(crate) fn from_valid(bases: Vec<u8>) -> Self {
        debug_assert!(!bases.is_empty() && bases.iter().all(|b| b"ACGT".contains(b)));
        Self(bases)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    pub fn first(&self) -> u8 {
        self.0[0]
    }
    pub fn last(&self) -> u8 {
        self.0[self.0.len() - 1]
    }
    /// Shift in `base` at the end.
    pub fn successor(&self, base: u8) -> Self {
        assert!(is_acgt(base), "{} is not a base", base as char);
        let mut bases = Vec::with_capacity(self.0.len());
        bases.extend_from_slice(&self.0[1..]);
        bases.push(base.to_ascii_uppercase());
        Self(bases)
    }
    /// Shift in `base` at the beginning.
    pub fn predecessor(&self, base: u8) -> Self {
        assert!(is_acgt(base), "{} is not a base", base as char);
        let mut bases = Vec::with_capacity(self.0.len());
        bases.push(base.to_ascii_uppercase());
        bases.extend_from_slice(&self.0[..self.0.len() - 1]);
        Self(bases)
    }
    /// Reverse complement.
    pub fn reverse(&self) -> Self {
        Self(revcmp(&self.0))
    }
    /// The lexicographically smaller of this k-mer and its reverse complement.
    pub fn minimal(&self) -> Self {
        let reverse = self.reverse();
        match reverse < *self {
            true => reverse,
            false => self.clone(),
        }
    }
    pub fn is_palindrome(&self) -> bool {
        crate::seq::is_palindrome(&self.0)
    }
}

/// Overlapping windows of length `k` of a read. Windows containing a base other than A,C,G,T are skipped.
#[derive(Debug, Clone)]
pub struct Kmers<'a> {
    read: &'a [u8],
    k: usize,
    // Start of the next window.
    idx: usize,
}

impl<'a> Kmers<'a> {
    pub fn new(read: &'a [u8], k: usize) -> Self {
        assert!(0 < k);
        Self { read, k, idx: 0 }
    }
}

impl<'a> std::iter::Iterator for Kmers<'a> {
    type Item = Kmer;
    fn next(&mut self) -> Option<Self::Item> {
        while self.idx + self.k <= self.read.len() {
            let window = &self.read[self.idx..self.idx + self.k];
            match window.iter().rposition(|&b| !is_acgt(b)) {
                // Every window containing this base is invalid.
                Some(bad) => self.idx += bad + 1,
                None => {
                    self.idx += 1;
                    let bases = window.iter().map(u8::to_ascii_uppercase).collect();
                    return Some(Kmer::from_valid(bases));
                }
            }
        }
        None
    }
}

pub fn kmers_of(read: &[u8], k: usize) -> Kmers {
    Kmers::new(read, k)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_xoshiro::Xoroshiro128PlusPlus;
    pub fn random_seq<R: rand::Rng>(rng: &mut R, len: usize) -> Vec<u8> {
        (0..len).filter_map(|_| b"ACGT".choose(rng)).copied().collect()
    }
    #[test]
    fn shift() {
        let kmer = Kmer::new(b"acgt").unwrap();
        assert_eq!(kmer.as_bytes(), b"ACGT");
        assert_eq!(kmer.successor(b'A').as_bytes(), b"CGTA");
        assert_eq!(kmer.predecessor(b'T').as_bytes(), b"TACG");
        assert_eq!(kmer.successor(b'G').predecessor(b'A'), kmer);
        let kmer = Kmer::new(b"AACG").unwrap();
        assert_eq!(kmer.reverse().as_bytes(), b"CGTT");
        assert_eq!(kmer.minimal(), kmer);
        assert_eq!(kmer.reverse().minimal(), kmer);
        assert!(Kmer::new(b"ACGT").unwrap().is_palindrome());
    }
    #[test]
    fn invalid_kmer() {
        assert!(matches!(
            Kmer::new(b"ACNT"),
            Err(AssemblyError::InvalidBase {
                base: 'N',
                position: 2
            })
        ));
        assert!(Kmer::new(b"").is_err());
    }
    #[test]
    fn canonicalization() {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(4829);
        for k in 1..40 {
            let kmer = Kmer::new(&random_seq(&mut rng, k)).unwrap();
            let minimal = kmer.minimal();
            assert_eq!(minimal, kmer.reverse().minimal());
            assert_eq!(minimal.minimal(), minimal);
            assert!(minimal <= kmer && minimal <= kmer.reverse());
            assert_eq!(kmer.reverse().reverse(), kmer);
        }
    }
    #[test]
    fn windows() {
        let read = b"ACGTNACGTTA";
        let kmers: Vec<_> = kmers_of(read, 3).map(|k| k.to_string()).collect();
        assert_eq!(kmers, vec!["ACG", "CGT", "ACG", "CGT", "GTT", "TTA"]);
        assert_eq!(kmers_of(b"ACG", 4).count(), 0);
        assert_eq!(kmers_of(b"NNNN", 2).count(), 0);
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(32);
        let read = random_seq(&mut rng, 500);
        assert_eq!(kmers_of(&read, 21).count(), 480);
        for (i, kmer) in kmers_of(&read, 21).enumerate() {
            assert_eq!(kmer.as_bytes(), &read[i..i + 21]);
        }
    }
}
