//! Read sources running on their own threads.
//! An [AsyncReadSource] moves a [ReadSource] into a producer thread, which sends batches of
//! fragments through a bounded channel in the order the source yields them.
//! Sources grouped in an [AsyncReadPool] share an abort flag: the first failure of any producer
//! stops all of them, and from then on consumers receive no more fragments.
use crate::error::{AssemblyError, Result};
use crate::read_source::ReadSource;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub type Fragment = Vec<Vec<u8>>;
pub type Batch = Vec<Fragment>;

enum Message {
    Batch(Batch),
    End,
    Failed(AssemblyError),
}

#[derive(Debug, Default)]
pub struct PoolState {
    aborted: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl PoolState {
    /// Returns true if this call is the one aborting the pool.
    pub fn abort(&self, reason: &str) -> bool {
        let mut failure = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        if self.aborted.swap(true, Ordering::SeqCst) {
            return false;
        }
        *failure = Some(reason.to_string());
        true
    }
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
    pub fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
    fn aborted_error(&self) -> AssemblyError {
        AssemblyError::Aborted(self.failure().unwrap_or_default())
    }
}

fn produce(
    mut source: Box<dyn ReadSource>,
    sender: Sender<Message>,
    state: Arc<PoolState>,
    batch_size: usize,
) -> Box<dyn ReadSource> {
    let mut batch = Vec::with_capacity(batch_size);
    let mut sent = 0;
    while !state.is_aborted() {
        match source.next_fragments() {
            Ok(Some(fragment)) => {
                batch.push(fragment);
                if batch.len() == batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    sent += 1;
                    if sender.send(Message::Batch(full)).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => {
                if !batch.is_empty() {
                    sent += 1;
                    if sender.send(Message::Batch(batch)).is_err() {
                        break;
                    }
                }
                trace!("PRODUCER\tEnd\t{}", sent);
                let _ = sender.send(Message::End);
                break;
            }
            Err(why) => {
                if state.abort(&why.to_string()) {
                    warn!("PRODUCER\tFailed\t{}", why);
                }
                let _ = sender.send(Message::Failed(why));
                break;
            }
        }
    }
    source
}

struct Producer {
    receiver: Receiver<Message>,
    handle: JoinHandle<Box<dyn ReadSource>>,
}

/// A [ReadSource] read ahead by a producer thread.
pub struct AsyncReadSource {
    producer: Option<Producer>,
    // The source while no producer is running.
    source: Option<Box<dyn ReadSource>>,
    state: Arc<PoolState>,
    batch_size: usize,
    capacity: usize,
    num_ends: usize,
    buffer: VecDeque<Fragment>,
    finished: bool,
}

impl AsyncReadSource {
    /// Start reading `source` in batches of `batch_size` fragments, with at most `capacity`
    /// batches waiting for the consumer.
    pub fn new(source: Box<dyn ReadSource>, batch_size: usize, capacity: usize) -> Self {
        Self::with_state(source, batch_size, capacity, Arc::new(PoolState::default()))
    }
    fn with_state(
        source: Box<dyn ReadSource>,
        batch_size: usize,
        capacity: usize,
        state: Arc<PoolState>,
    ) -> Self {
        let mut reader = Self {
            num_ends: source.num_ends(),
            producer: None,
            source: Some(source),
            state,
            batch_size: batch_size.max(1),
            capacity,
            buffer: VecDeque::new(),
            finished: false,
        };
        reader.start();
        reader
    }
    fn start(&mut self) {
        let source = match self.source.take() {
            Some(source) => source,
            None => return,
        };
        let (sender, receiver) = bounded(self.capacity);
        let state = self.state.clone();
        let batch_size = self.batch_size;
        let handle = std::thread::spawn(move || produce(source, sender, state, batch_size));
        self.producer = Some(Producer { receiver, handle });
        self.finished = false;
    }
    // Disconnect the producer and take the source back.
    fn stop(&mut self) -> Result<()> {
        self.buffer.clear();
        if let Some(Producer { receiver, handle }) = self.producer.take() {
            drop(receiver);
            let source = handle.join().map_err(|_| AssemblyError::ProducerPanicked)?;
            self.source = Some(source);
        }
        Ok(())
    }
    /// The next batch, in the order of the source, or None at the end.
    /// Once the pool is aborted, the producer's own failure is returned to this consumer if it
    /// is the one that failed, and [AssemblyError::Aborted] otherwise.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.finished && !self.state.is_aborted() {
            return Ok(None);
        }
        let receiver = match self.producer.as_ref() {
            Some(producer) => &producer.receiver,
            None if self.state.is_aborted() => return Err(self.state.aborted_error()),
            None => return Ok(None),
        };
        loop {
            let message = receiver.recv();
            if self.state.is_aborted() {
                match message {
                    Ok(Message::Batch(_)) => continue,
                    Ok(Message::Failed(why)) => return Err(why),
                    Ok(Message::End) | Err(_) => return Err(self.state.aborted_error()),
                }
            }
            return match message {
                Ok(Message::Batch(batch)) => Ok(Some(batch)),
                Ok(Message::End) => {
                    self.finished = true;
                    Ok(None)
                }
                Ok(Message::Failed(why)) => Err(why),
                Err(_) => Err(AssemblyError::ProducerPanicked),
            };
        }
    }
    pub fn is_aborted(&self) -> bool {
        self.state.is_aborted()
    }
    /// Abort every source sharing this one's pool.
    pub fn abort(&self, reason: &str) {
        if self.state.abort(reason) {
            warn!("POOL\tAborted\t{}", reason);
        }
    }
    /// A guard aborting the pool if it is dropped while its thread panics.
    /// Consumers hold it so that a panic stops their siblings before the panic is joined.
    pub fn abort_on_panic(&self) -> AbortOnPanic {
        AbortOnPanic {
            state: self.state.clone(),
        }
    }
    /// Stop the producer. Fails if the producer panicked.
    pub fn close(&mut self) -> Result<()> {
        self.stop()
    }
}

pub struct AbortOnPanic {
    state: Arc<PoolState>,
}

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() && self.state.abort("a consumer panicked") {
            warn!("POOL\tAborted\tConsumerPanicked");
        }
    }
}

impl ReadSource for AsyncReadSource {
    fn next_fragments(&mut self) -> Result<Option<Fragment>> {
        if self.buffer.is_empty() {
            match self.next_batch()? {
                Some(batch) => self.buffer.extend(batch),
                None => return Ok(None),
            }
        }
        Ok(self.buffer.pop_front())
    }
    fn reset(&mut self) -> Result<()> {
        self.stop()?;
        if let Some(source) = self.source.as_mut() {
            source.reset()?;
        }
        self.start();
        Ok(())
    }
    fn num_ends(&self) -> usize {
        self.num_ends
    }
}

impl Drop for AsyncReadSource {
    fn drop(&mut self) {
        if let Err(why) = self.stop() {
            warn!("PRODUCER\tDrop\t{}", why);
        }
    }
}

/// Read sources sharing one abort flag.
pub struct AsyncReadPool {
    sources: Vec<AsyncReadSource>,
    state: Arc<PoolState>,
}

impl AsyncReadPool {
    pub fn new(sources: Vec<Box<dyn ReadSource>>, batch_size: usize, capacity: usize) -> Self {
        let state = Arc::new(PoolState::default());
        let sources: Vec<_> = sources
            .into_iter()
            .map(|source| AsyncReadSource::with_state(source, batch_size, capacity, state.clone()))
            .collect();
        debug!("POOL\tSources\t{}", sources.len());
        Self { sources, state }
    }
    pub fn sources_mut(&mut self) -> &mut [AsyncReadSource] {
        &mut self.sources
    }
    pub fn len(&self) -> usize {
        self.sources.len()
    }
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
    /// Stop every producer. Consumers get [AssemblyError::Aborted] from now on.
    pub fn abort(&self, reason: &str) {
        if self.state.abort(reason) {
            warn!("POOL\tAborted\t{}", reason);
        }
    }
    pub fn is_aborted(&self) -> bool {
        self.state.is_aborted()
    }
    /// Stop every producer and report the failure of the pool, if any.
    pub fn close(mut self) -> Result<()> {
        let mut panicked = false;
        for source in self.sources.iter_mut() {
            panicked |= source.close().is_err();
        }
        if panicked {
            Err(AssemblyError::ProducerPanicked)
        } else if self.state.is_aborted() {
            Err(self.state.aborted_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read_source::{FragmentSource, MemoryReader};
    fn memory_source(reads: &[&str]) -> Box<dyn ReadSource> {
        let reads = reads.iter().map(|r| r.as_bytes().to_vec()).collect();
        Box::new(FragmentSource::single(Box::new(MemoryReader::new(reads))))
    }
    // Yields `good` fragments, then fails.
    struct Failing {
        good: usize,
        yielded: usize,
    }
    impl ReadSource for Failing {
        fn next_fragments(&mut self) -> Result<Option<Fragment>> {
            if self.yielded < self.good {
                self.yielded += 1;
                Ok(Some(vec![b"ACGT".to_vec()]))
            } else {
                let why = std::io::Error::new(std::io::ErrorKind::InvalidData, "broken record");
                Err(AssemblyError::Io(why))
            }
        }
        fn reset(&mut self) -> Result<()> {
            self.yielded = 0;
            Ok(())
        }
        fn num_ends(&self) -> usize {
            1
        }
    }
    fn drain(source: &mut dyn ReadSource) -> Vec<Fragment> {
        let mut fragments = vec![];
        while let Some(fragment) = source.next_fragments().unwrap() {
            fragments.push(fragment);
        }
        fragments
    }
    #[test]
    fn order_and_reset() {
        let reads: Vec<String> = (1..=10).map(|i| "A".repeat(i)).collect();
        let reads: Vec<&str> = reads.iter().map(|r| r.as_str()).collect();
        let mut source = AsyncReadSource::new(memory_source(&reads), 3, 1);
        assert_eq!(source.num_ends(), 1);
        let fragments = drain(&mut source);
        let expected: Vec<Fragment> = reads.iter().map(|r| vec![r.as_bytes().to_vec()]).collect();
        assert_eq!(fragments, expected);
        assert!(source.next_batch().unwrap().is_none());
        source.reset().unwrap();
        assert_eq!(source.next_batch().unwrap().map(|b| b.len()), Some(3));
        source.reset().unwrap();
        assert_eq!(drain(&mut source), expected);
        source.close().unwrap();
    }
    #[test]
    fn failure_aborts_siblings() {
        let reads = vec!["ACGT"; 1000];
        let failing = Box::new(Failing { good: 2, yielded: 0 });
        let mut pool = AsyncReadPool::new(vec![failing, memory_source(&reads)], 1, 1);
        assert_eq!(pool.len(), 2);
        let sources = pool.sources_mut();
        let mut good = 0;
        let error = loop {
            match sources[0].next_batch() {
                Ok(Some(_)) => good += 1,
                Ok(None) => panic!("failure was not reported"),
                Err(why) => break why,
            }
        };
        assert!(good <= 2);
        assert!(matches!(error, AssemblyError::Io(_)), "{}", error);
        assert!(sources[0].next_batch().unwrap_err().is_aborted());
        let error = loop {
            match sources[1].next_batch() {
                Ok(_) => panic!("aborted pool yielded fragments"),
                Err(why) => break why,
            }
        };
        assert!(error.is_aborted());
        assert!(pool.is_aborted());
        match pool.close() {
            Err(AssemblyError::Aborted(message)) => assert!(message.contains("broken record")),
            other => panic!("{:?}", other),
        }
    }
    #[test]
    fn consumer_abort() {
        let reads = vec!["ACGT"; 100];
        let mut pool = AsyncReadPool::new(vec![memory_source(&reads)], 10, 2);
        pool.abort("mapping failed");
        assert!(pool.sources_mut()[0].next_batch().unwrap_err().is_aborted());
        assert!(pool.close().is_err());
        let pool = AsyncReadPool::new(vec![memory_source(&reads)], 10, 2);
        assert!(pool.close().is_ok());
    }
    #[test]
    fn panicking_consumer_aborts_pool() {
        let reads = vec!["ACGT"; 100];
        let sources = vec![memory_source(&reads), memory_source(&reads)];
        let mut pool = AsyncReadPool::new(sources, 1, 1);
        let (first, second) = pool.sources_mut().split_at_mut(1);
        let (first, second) = (&mut first[0], &mut second[0]);
        assert!(second.next_batch().unwrap().is_some());
        let joined = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = first.abort_on_panic();
                    assert!(first.next_batch().unwrap().is_some());
                    panic!("mapping failed");
                })
                .join()
        });
        assert!(joined.is_err());
        assert!(second.next_batch().unwrap_err().is_aborted());
        // Dropped without a panic, the guard leaves the pool alone.
        let mut pool = AsyncReadPool::new(vec![memory_source(&reads)], 1, 1);
        drop(pool.sources_mut()[0].abort_on_panic());
        assert!(!pool.is_aborted());
        assert_eq!(drain(&mut pool.sources_mut()[0]).len(), 100);
        assert!(pool.close().is_ok());
        match pool_close_message(vec![memory_source(&reads)]) {
            Some(message) => assert!(message.contains("panicked")),
            None => panic!("the pool was not aborted"),
        }
    }
    // Panic in a consumer holding a guard, then close the pool and return its failure.
    fn pool_close_message(sources: Vec<Box<dyn ReadSource>>) -> Option<String> {
        let mut pool = AsyncReadPool::new(sources, 1, 1);
        let guard = pool.sources_mut()[0].abort_on_panic();
        let joined = std::thread::spawn(move || {
            let _guard = guard;
            panic!("mapping failed");
        })
        .join();
        assert!(joined.is_err());
        match pool.close() {
            Err(AssemblyError::Aborted(message)) => Some(message),
            _ => None,
        }
    }
}
