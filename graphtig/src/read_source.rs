//! Sources of sequencing reads.
//! A [SequenceReader] yields single sequences, and a [ReadSource] yields fragments: the reads
//! sequenced from one molecule (one read for single-end data, two for paired data), already put
//! in the orientation of the fragment for the protocols reading one or both ends reversed.
use crate::error::{AssemblyError, Result};
use crate::seq::{normalize, revcmp};
use needletail::{parse_fastx_file, FastxReader as NeedletailReader};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A restartable stream of sequences.
pub trait SequenceReader: Send {
    fn next_sequence(&mut self) -> Result<Option<Vec<u8>>>;
    /// Restart from the first sequence.
    fn reset(&mut self) -> Result<()>;
}

/// Sequences of a FASTA or FASTQ file, gzipped or not.
/// Bases are uppercased and anything other than A,C,G,T or `-` becomes `N`.
pub struct FastxReader {
    path: PathBuf,
    reader: Box<dyn NeedletailReader>,
}

impl std::fmt::Debug for FastxReader {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "FastxReader({})", self.path.display())
    }
}

fn open_fastx(path: &Path) -> Result<Box<dyn NeedletailReader>> {
    parse_fastx_file(path).map_err(|why| AssemblyError::Parse {
        path: path.display().to_string(),
        message: why.to_string(),
    })
}

impl FastxReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = open_fastx(&path)?;
        debug!("READS\tOpen\t{}", path.display());
        Ok(Self { path, reader })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SequenceReader for FastxReader {
    fn next_sequence(&mut self) -> Result<Option<Vec<u8>>> {
        match self.reader.next() {
            None => Ok(None),
            Some(Ok(record)) => Ok(Some(normalize(&record.seq()))),
            Some(Err(why)) => Err(AssemblyError::Parse {
                path: self.path.display().to_string(),
                message: why.to_string(),
            }),
        }
    }
    fn reset(&mut self) -> Result<()> {
        self.reader = open_fastx(&self.path)?;
        Ok(())
    }
}

/// Sequences held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    seqs: Vec<Vec<u8>>,
    index: usize,
}

impl MemoryReader {
    pub fn new(seqs: Vec<Vec<u8>>) -> Self {
        let seqs = seqs.iter().map(|seq| normalize(seq)).collect();
        Self { seqs, index: 0 }
    }
}

impl SequenceReader for MemoryReader {
    fn next_sequence(&mut self) -> Result<Option<Vec<u8>>> {
        let seq = self.seqs.get(self.index).cloned();
        self.index += seq.is_some() as usize;
        Ok(seq)
    }
    fn reset(&mut self) -> Result<()> {
        self.index = 0;
        Ok(())
    }
}

/// A restartable stream of fragments.
pub trait ReadSource: Send {
    /// The reads of the next fragment, or None at the end.
    fn next_fragments(&mut self) -> Result<Option<Vec<Vec<u8>>>>;
    fn reset(&mut self) -> Result<()>;
    /// The number of reads per fragment.
    fn num_ends(&self) -> usize;
}

/// The sequencing protocol, which fixes the number of ends and their orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    Single,
    /// Two reads facing each other: the second one is read as is.
    Paired,
    /// 454 paired ends: the second read is reverse complemented.
    Roche454,
    /// Mate pairs: both reads are reverse complemented.
    MatePair,
}

impl Layout {
    pub fn num_ends(&self) -> usize {
        match self {
            Layout::Single => 1,
            _ => 2,
        }
    }
    fn is_reversed(&self, end: usize) -> bool {
        matches!((self, end), (Layout::Roche454, 1) | (Layout::MatePair, _))
    }
}

impl std::str::FromStr for Layout {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Layout::Single),
            "paired" => Ok(Layout::Paired),
            "454" | "roche454" => Ok(Layout::Roche454),
            "matepair" | "mate-pair" => Ok(Layout::MatePair),
            _ => Err(format!("{} is not a read layout", s)),
        }
    }
}

/// Fragments built by reading one sequence from each reader in turn.
pub struct FragmentSource {
    readers: Vec<Box<dyn SequenceReader>>,
    layout: Layout,
    fragments: usize,
}

impl FragmentSource {
    pub fn new(readers: Vec<Box<dyn SequenceReader>>, layout: Layout) -> Result<Self> {
        if readers.len() != layout.num_ends() {
            return Err(AssemblyError::ReaderCount {
                expected: layout.num_ends(),
                actual: readers.len(),
            });
        }
        Ok(Self {
            readers,
            layout,
            fragments: 0,
        })
    }
    pub fn single(reader: Box<dyn SequenceReader>) -> Self {
        Self {
            readers: vec![reader],
            layout: Layout::Single,
            fragments: 0,
        }
    }
    pub fn paired(left: Box<dyn SequenceReader>, right: Box<dyn SequenceReader>) -> Self {
        Self::with_ends(left, right, Layout::Paired)
    }
    pub fn roche454(left: Box<dyn SequenceReader>, right: Box<dyn SequenceReader>) -> Self {
        Self::with_ends(left, right, Layout::Roche454)
    }
    pub fn mate_pair(left: Box<dyn SequenceReader>, right: Box<dyn SequenceReader>) -> Self {
        Self::with_ends(left, right, Layout::MatePair)
    }
    fn with_ends(
        left: Box<dyn SequenceReader>,
        right: Box<dyn SequenceReader>,
        layout: Layout,
    ) -> Self {
        Self {
            readers: vec![left, right],
            layout,
            fragments: 0,
        }
    }
    /// Open FASTA/FASTQ files, one per end.
    pub fn open<P: AsRef<Path>>(paths: &[P], layout: Layout) -> Result<Self> {
        let readers = paths
            .iter()
            .map(|path| FastxReader::open(path).map(|r| Box::new(r) as Box<dyn SequenceReader>))
            .collect::<Result<Vec<_>>>()?;
        Self::new(readers, layout)
    }
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl ReadSource for FragmentSource {
    fn next_fragments(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        let mut ends = Vec::with_capacity(self.readers.len());
        for reader in self.readers.iter_mut() {
            ends.push(reader.next_sequence()?);
        }
        if ends.iter().all(|end| end.is_none()) {
            return Ok(None);
        }
        if ends.iter().any(|end| end.is_none()) {
            return Err(AssemblyError::MismatchedEnds(self.fragments));
        }
        self.fragments += 1;
        let layout = self.layout;
        let fragment = ends
            .into_iter()
            .flatten()
            .enumerate()
            .map(|(i, seq)| match layout.is_reversed(i) {
                true => revcmp(&seq),
                false => seq,
            })
            .collect();
        Ok(Some(fragment))
    }
    fn reset(&mut self) -> Result<()> {
        self.fragments = 0;
        self.readers.iter_mut().try_for_each(|reader| reader.reset())
    }
    fn num_ends(&self) -> usize {
        self.layout.num_ends()
    }
}

/// Sources read one after another.
pub struct ChainedSource {
    sources: Vec<Box<dyn ReadSource>>,
    current: usize,
}

impl ChainedSource {
    /// Every source must yield fragments with the same number of ends.
    pub fn new(sources: Vec<Box<dyn ReadSource>>) -> Result<Self> {
        if let Some(first) = sources.first() {
            let expected = first.num_ends();
            if let Some(other) = sources.iter().find(|s| s.num_ends() != expected) {
                return Err(AssemblyError::ReaderCount {
                    expected,
                    actual: other.num_ends(),
                });
            }
        }
        Ok(Self {
            sources,
            current: 0,
        })
    }
}

impl ReadSource for ChainedSource {
    fn next_fragments(&mut self) -> Result<Option<Vec<Vec<u8>>>> {
        while let Some(source) = self.sources.get_mut(self.current) {
            match source.next_fragments()? {
                Some(fragment) => return Ok(Some(fragment)),
                None => self.current += 1,
            }
        }
        Ok(None)
    }
    fn reset(&mut self) -> Result<()> {
        self.current = 0;
        self.sources.iter_mut().try_for_each(|source| source.reset())
    }
    fn num_ends(&self) -> usize {
        self.sources.first().map_or(1, |source| source.num_ends())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    fn memory(seqs: &[&str]) -> Box<dyn SequenceReader> {
        let seqs = seqs.iter().map(|s| s.as_bytes().to_vec()).collect();
        Box::new(MemoryReader::new(seqs))
    }
    fn drain(source: &mut dyn ReadSource) -> Vec<Vec<Vec<u8>>> {
        let mut fragments = vec![];
        while let Some(fragment) = source.next_fragments().unwrap() {
            fragments.push(fragment);
        }
        fragments
    }
    #[test]
    fn layouts() {
        let left = ["AACG", "ttga"];
        let right = ["GGCA", "ACRT"];
        let mut single = FragmentSource::single(memory(&left));
        assert_eq!(
            drain(&mut single),
            vec![vec![b"AACG".to_vec()], vec![b"TTGA".to_vec()]]
        );
        let mut paired = FragmentSource::paired(memory(&left), memory(&right));
        let fragments = drain(&mut paired);
        assert_eq!(fragments[1], vec![b"TTGA".to_vec(), b"ACNT".to_vec()]);
        let mut roche = FragmentSource::roche454(memory(&left), memory(&right));
        let fragments = drain(&mut roche);
        assert_eq!(fragments[0], vec![b"AACG".to_vec(), b"TGCC".to_vec()]);
        let mut mate = FragmentSource::mate_pair(memory(&left), memory(&right));
        let fragments = drain(&mut mate);
        assert_eq!(fragments[0], vec![b"CGTT".to_vec(), b"TGCC".to_vec()]);
        assert_eq!(mate.num_ends(), 2);
        mate.reset().unwrap();
        assert_eq!(drain(&mut mate), fragments);
        assert_eq!("454".parse::<Layout>(), Ok(Layout::Roche454));
        assert!("triple".parse::<Layout>().is_err());
    }
    #[test]
    fn mismatched_ends() {
        let mut paired = FragmentSource::paired(memory(&["AC", "GT"]), memory(&["AC"]));
        assert!(paired.next_fragments().unwrap().is_some());
        assert!(matches!(
            paired.next_fragments(),
            Err(AssemblyError::MismatchedEnds(1))
        ));
        let readers = vec![memory(&["AC"])];
        assert!(FragmentSource::new(readers, Layout::Paired).is_err());
    }
    #[test]
    fn chained() {
        let first: Box<dyn ReadSource> = Box::new(FragmentSource::single(memory(&["AC", "GT"])));
        let second: Box<dyn ReadSource> = Box::new(FragmentSource::single(memory(&["TT"])));
        let mut chained = ChainedSource::new(vec![first, second]).unwrap();
        let expected = vec![
            vec![b"AC".to_vec()],
            vec![b"GT".to_vec()],
            vec![b"TT".to_vec()],
        ];
        assert_eq!(drain(&mut chained), expected);
        chained.reset().unwrap();
        assert_eq!(drain(&mut chained), expected);
        let single: Box<dyn ReadSource> = Box::new(FragmentSource::single(memory(&["AC"])));
        let paired: Box<dyn ReadSource> =
            Box::new(FragmentSource::paired(memory(&["AC"]), memory(&["GT"])));
        assert!(ChainedSource::new(vec![single, paired]).is_err());
    }
    #[test]
    fn fastx_files() {
        let dir = std::env::temp_dir().join(format!("graphtig_fastx_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let fasta = dir.join("reads.fa");
        let mut wtr = std::fs::File::create(&fasta).unwrap();
        writeln!(wtr, ">r1\nACGT\nAC\n>r2\nggyt").unwrap();
        drop(wtr);
        let fastq = dir.join("reads.fq");
        let mut wtr = std::fs::File::create(&fastq).unwrap();
        writeln!(wtr, "@r1\nTTTT\n+\nIIII\n@r2\nCCAA\n+\nIIII").unwrap();
        drop(wtr);
        let mut source = FragmentSource::open(&[&fasta, &fastq], Layout::Paired).unwrap();
        let fragments = drain(&mut source);
        assert_eq!(
            fragments,
            vec![
                vec![b"ACGTAC".to_vec(), b"TTTT".to_vec()],
                vec![b"GGNT".to_vec(), b"CCAA".to_vec()]
            ]
        );
        source.reset().unwrap();
        assert_eq!(drain(&mut source), fragments);
        assert!(FastxReader::open(dir.join("missing.fa")).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
