//! Simplification of a contig graph.
//! Each pass runs until it has nothing left to do, so that running it again leaves the graph untouched.
//! * [trim_tips] deletes short or weakly supported dead ends,
//! * [resolve_ambiguous_paths] deletes paths out-competed by a sibling leaving the same contig,
//! * [merge_nodes] replaces unbranched runs of contigs by a single contig,
//! * [consensus] replaces well supported paths by a single contig.
use crate::error::Result;
use crate::traversion::TraversionTable;
use definitions::{reverse_path, Attributes, ContigGraph, MERGED_FROM, READ_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifyConfig {
    /// Dead ends shorter than this are tips.
    pub min_tip_length: usize,
    /// Dead ends supported by fewer reads than this are tips.
    pub min_tip_support: u64,
    /// A path wins over its siblings if its support exceeds the runner-up by at least this much.
    pub ambiguity_threshold: u64,
    /// Require the contig at the far end of a winning path to pick the same path.
    pub bidirectional: bool,
    /// Paths supported by more reads than this become contigs.
    pub consensus_threshold: u64,
}

impl std::default::Default for SimplifyConfig {
    fn default() -> Self {
        Self {
            min_tip_length: 50,
            min_tip_support: 0,
            ambiguity_threshold: 2,
            bidirectional: false,
            consensus_threshold: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifyReport {
    pub tips: usize,
    pub ambiguous_paths: usize,
    pub merged: usize,
    pub consensus: usize,
}

impl std::fmt::Display for SimplifyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.tips, self.ambiguous_paths, self.merged, self.consensus
        )
    }
}

/// The number of supporting reads recorded in `attributes`.
pub fn read_count(attributes: &Attributes) -> u64 {
    attributes
        .get(READ_COUNT)
        .and_then(|x| x.parse().ok())
        .unwrap_or(0)
}

/// Add the attributes of `from` into `into`. Numeric values are summed and other values are
/// concatenated if they differ. Provenance lists are always concatenated.
pub fn merge_attributes(into: &mut Attributes, from: &Attributes) {
    for (key, value) in from.iter() {
        match into.get_mut(key) {
            None => {
                into.insert(key.clone(), value.clone());
            }
            Some(current) if key.as_str() == MERGED_FROM => {
                *current = format!("{};{}", current, value);
            }
            Some(current) => match (current.parse::<u64>(), value.parse::<u64>()) {
                (Ok(x), Ok(y)) => *current = (x + y).to_string(),
                _ if current != value => *current = format!("{};{}", current, value),
                _ => {}
            },
        }
    }
}

fn contig_support(graph: &ContigGraph, id: i64) -> u64 {
    read_count(graph.contig_attributes(id))
}

fn path_support(graph: &ContigGraph, id: i64) -> u64 {
    read_count(graph.path_attributes(id))
}

// Add a path carrying `attributes`, or add them to an identical path if there is one.
fn add_or_merge_path(graph: &mut ContigGraph, contigs: &[i64], attributes: &Attributes) -> Result<i64> {
    let id = match graph.find_paths(contigs).first() {
        Some(&id) => id.abs(),
        None => graph.add_path(contigs)?,
    };
    let mut merged = graph.path_attributes(id).clone();
    merge_attributes(&mut merged, attributes);
    for (key, value) in merged {
        graph.set_path_attribute(id, &key, value);
    }
    Ok(id)
}

fn provenance(contigs: &[i64]) -> String {
    let ids: Vec<_> = contigs.iter().map(|c| c.to_string()).collect();
    ids.join(",")
}

// The ids merged into a new contig, followed by the provenance the merged contigs carried.
fn nested_provenance(contigs: &[i64], attributes: &mut Attributes) -> String {
    match attributes.remove(MERGED_FROM) {
        Some(inherited) => format!("{};{}", provenance(contigs), inherited),
        None => provenance(contigs),
    }
}

/// Delete dead ends shorter than the minimum length or less supported than the minimum support.
/// A dead end attached to the graph is deleted only if its neighbour has another continuation
/// which is not a tip itself. Returns the number of deleted contigs.
pub fn trim_tips(graph: &mut ContigGraph, config: &SimplifyConfig) -> usize {
    let mut removed = 0;
    loop {
        let table = TraversionTable::new(graph);
        let candidates: HashSet<u64> = graph
            .contig_ids()
            .filter(|&id| {
                let weak = graph.contig_length(id) < config.min_tip_length
                    || contig_support(graph, id) < config.min_tip_support;
                let traversion = table.traversion(id);
                weak && (traversion.next.is_empty() || traversion.previous.is_empty())
            })
            .map(|id| id as u64)
            .collect();
        let mut tips: Vec<i64> = graph
            .contig_ids()
            .filter(|id| candidates.contains(&(*id as u64)))
            .filter(|&id| {
                let has_alternative = |alternatives: &[i64]| {
                    alternatives
                        .iter()
                        .any(|a| a.unsigned_abs() != id as u64 && !candidates.contains(&a.unsigned_abs()))
                };
                let traversion = table.traversion(id);
                match (traversion.next.is_empty(), traversion.previous.is_empty()) {
                    (true, true) => true,
                    (true, false) => traversion
                        .previous
                        .iter()
                        .all(|&p| has_alternative(table.next(p))),
                    (false, true) => traversion
                        .next
                        .iter()
                        .all(|&n| has_alternative(table.previous(n))),
                    (false, false) => false,
                }
            })
            .collect();
        if tips.is_empty() {
            break;
        }
        tips.sort_unstable();
        for &id in tips.iter() {
            graph.delete_contig(id);
        }
        removed += tips.len();
    }
    debug!("SIMPLIFY\tTips\t{}", removed);
    removed
}

// Signed ids of the paths of length two or more leaving each oriented contig.
fn leaving_paths(graph: &ContigGraph) -> BTreeMap<i64, Vec<i64>> {
    let normalize = |id: i64| match graph.is_palindrome(id) {
        true => id.abs(),
        false => id,
    };
    let mut leaving: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for path in graph.path_ids().filter(|&p| 2 <= graph.path_length(p)) {
        for oriented in [path, -path] {
            let first = normalize(graph.path_contig(oriented, 0));
            leaving.entry(first).or_default().push(oriented);
        }
    }
    leaving
}

fn winner(graph: &ContigGraph, paths: &[i64], threshold: u64) -> Option<i64> {
    if paths.len() < 2 {
        return None;
    }
    let mut supports: Vec<(u64, i64)> = paths.iter().map(|&p| (path_support(graph, p), p)).collect();
    supports.sort_by(|x, y| y.0.cmp(&x.0).then(x.1.cmp(&y.1)));
    let (best, path) = supports[0];
    let second = supports[1].0;
    (second < best && second + threshold <= best).then(|| path)
}

/// Where several paths leave the same contig and one of them is supported by at least
/// `ambiguity_threshold` more reads than any other, delete the others.
/// Returns the number of deleted paths.
pub fn resolve_ambiguous_paths(graph: &mut ContigGraph, config: &SimplifyConfig) -> usize {
    let mut removed = 0;
    loop {
        let leaving = leaving_paths(graph);
        let mut winners: BTreeSet<u64> = BTreeSet::new();
        let mut losers: BTreeSet<u64> = BTreeSet::new();
        for paths in leaving.values() {
            let best = match winner(graph, paths, config.ambiguity_threshold) {
                Some(best) => best,
                None => continue,
            };
            if config.bidirectional {
                let last = graph.path_contig(best, graph.path_length(best) - 1);
                let far_end = match graph.is_palindrome(last) {
                    true => last.abs(),
                    false => -last,
                };
                let incoming = leaving.get(&far_end).map(|x| x.as_slice()).unwrap_or(&[]);
                let agree = incoming.len() == 1
                    || winner(graph, incoming, config.ambiguity_threshold) == Some(-best);
                if !agree {
                    continue;
                }
            }
            winners.insert(best.unsigned_abs());
            losers.extend(paths.iter().map(|p| p.unsigned_abs()));
        }
        let losers: Vec<_> = losers.difference(&winners).copied().collect();
        if losers.is_empty() {
            break;
        }
        for &path in losers.iter() {
            graph.delete_path(path as i64);
        }
        removed += losers.len();
    }
    debug!("SIMPLIFY\tAmbiguous\t{}", removed);
    removed
}

// The contig following `from` if `from` is its only predecessor and it is its only successor.
fn unique_link(table: &TraversionTable, from: i64) -> Option<i64> {
    match table.next(from) {
        &[to] if table.previous(to) == [from] => Some(to),
        _ => None,
    }
}

// Maximal runs of two or more non-palindromic contigs joined by unique links.
fn unitig_runs(graph: &ContigGraph, table: &TraversionTable) -> Vec<Vec<i64>> {
    let mut visited = vec![false; graph.num_contigs() + 1];
    let mut runs = vec![];
    for id in graph.contig_ids() {
        if visited[id as usize] || table.is_palindrome(id) {
            continue;
        }
        let mut run = VecDeque::from(vec![id]);
        let mut members: HashSet<u64> = HashSet::from([id as u64]);
        let joinable = |next: i64, members: &mut HashSet<u64>| {
            let index = next.unsigned_abs();
            !table.is_palindrome(next) && !visited[index as usize] && members.insert(index)
        };
        let mut current = id;
        while let Some(next) = unique_link(table, current) {
            if !joinable(next, &mut members) {
                break;
            }
            run.push_back(next);
            current = next;
        }
        let mut current = id;
        while let Some(prev) = unique_link(table, -current).map(|x| -x) {
            if !joinable(prev, &mut members) {
                break;
            }
            run.push_front(prev);
            current = prev;
        }
        for &member in run.iter() {
            visited[member.unsigned_abs() as usize] = true;
        }
        if 2 <= run.len() {
            runs.push(run.into_iter().collect());
        }
    }
    runs
}

// The length of the longest prefix of `contigs` which is a contiguous part of `run`.
fn match_run(contigs: &[i64], run: &[i64]) -> Option<usize> {
    let start = run.iter().position(|&r| r == contigs[0])?;
    let len = contigs
        .iter()
        .zip(run[start..].iter())
        .take_while(|(c, r)| c == r)
        .count();
    Some(len)
}

fn replace_run(contigs: &[i64], run: &[i64], merged: i64) -> Vec<i64> {
    let reversed = reverse_path(run);
    let mut replaced = vec![];
    let mut i = 0;
    while i < contigs.len() {
        if let Some(len) = match_run(&contigs[i..], run) {
            replaced.push(merged);
            i += len;
        } else if let Some(len) = match_run(&contigs[i..], &reversed) {
            replaced.push(-merged);
            i += len;
        } else {
            replaced.push(contigs[i]);
            i += 1;
        }
    }
    replaced
}

fn merge_run(graph: &mut ContigGraph, run: &[i64]) -> Result<i64> {
    let seq = graph.path_sequence(run);
    let merged = graph.add_contig(&seq)?;
    let mut attributes = Attributes::new();
    for &id in run.iter() {
        merge_attributes(&mut attributes, graph.contig_attributes(id));
    }
    let touching: BTreeSet<i64> = run.iter().flat_map(|&id| graph.paths_of(id)).collect();
    for path in touching {
        let replaced = replace_run(&graph.path(path), run, merged);
        let path_attributes = graph.path_attributes(path).clone();
        match replaced.len() {
            1 => merge_attributes(&mut attributes, &path_attributes),
            _ => {
                add_or_merge_path(graph, &replaced, &path_attributes)?;
            }
        }
        graph.delete_path(path);
    }
    let merged_from = nested_provenance(run, &mut attributes);
    attributes.insert(MERGED_FROM.to_string(), merged_from);
    for (key, value) in attributes {
        graph.set_contig_attribute(merged, &key, value);
    }
    for &id in run.iter() {
        graph.delete_contig(id);
    }
    trace!("SIMPLIFY\tMerge\t{}\t{}", merged, provenance(run));
    Ok(merged)
}

/// Replace each maximal run of contigs linked one to one by a single contig.
/// Paths through a run are rewritten to go through the new contig, and paths lying inside a run
/// hand their support over to it. Palindromic contigs and cycles are never merged.
/// Returns the number of merged runs.
pub fn merge_nodes(graph: &mut ContigGraph) -> Result<usize> {
    let mut merged = 0;
    loop {
        let table = TraversionTable::new(graph);
        let runs = unitig_runs(graph, &table);
        if runs.is_empty() {
            break;
        }
        for run in runs.iter() {
            merge_run(graph, run)?;
        }
        merged += runs.len();
    }
    debug!("SIMPLIFY\tMerged\t{}", merged);
    Ok(merged)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Piece {
    Contig(i64),
    Consensus { reverse: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Relation {
    // Lies inside the consensus path.
    Inside,
    // Continues the consensus path from outside; can be rewritten to use the new contig.
    Rewritable(Vec<Piece>),
    // Leaves or enters the consensus path somewhere in the middle.
    Alternative,
}

// (offset, is_reverse) of `segment` as a contiguous part of `path` or of its reverse.
fn locate(segment: &[i64], path: &[i64]) -> Option<(usize, bool)> {
    let find = |target: &[i64]| {
        target
            .windows(segment.len())
            .position(|w| w == segment)
    };
    if segment.len() > path.len() {
        return None;
    }
    find(path)
        .map(|offset| (offset, false))
        .or_else(|| find(&reverse_path(path)).map(|offset| (offset, true)))
}

fn relation(other: &[i64], path: &[i64]) -> Relation {
    let members: HashSet<u64> = path.iter().map(|c| c.unsigned_abs()).collect();
    let mut pieces = vec![];
    let mut i = 0;
    while i < other.len() {
        if !members.contains(&other[i].unsigned_abs()) {
            pieces.push(Piece::Contig(other[i]));
            i += 1;
            continue;
        }
        let j = (i..other.len())
            .find(|&j| !members.contains(&other[j].unsigned_abs()))
            .unwrap_or(other.len());
        let segment = &other[i..j];
        let (offset, reverse) = match locate(segment, path) {
            Some(found) => found,
            None => return Relation::Alternative,
        };
        let whole = segment.len() == path.len();
        let is_prefix = offset == 0;
        let is_suffix = offset + segment.len() == path.len();
        let inside = i == 0 && j == other.len();
        if inside && !whole {
            return Relation::Inside;
        }
        let continues = whole || (is_prefix && j == other.len()) || (is_suffix && i == 0);
        if !continues {
            return Relation::Alternative;
        }
        pieces.push(Piece::Consensus { reverse });
        i = j;
    }
    match pieces.len() {
        1 => Relation::Inside,
        _ => Relation::Rewritable(pieces),
    }
}

#[derive(Debug, Clone)]
struct ConsensusPlan {
    path: i64,
    contigs: Vec<i64>,
    absorbed: Vec<i64>,
    rewritten: Vec<(i64, Vec<Piece>)>,
    dropped: Vec<i64>,
}

fn plan_consensus(graph: &ContigGraph, path: i64, config: &SimplifyConfig) -> Option<ConsensusPlan> {
    let contigs = graph.path(path);
    let touching: BTreeSet<i64> = contigs
        .iter()
        .flat_map(|&c| graph.paths_of(c))
        .filter(|&p| p != path)
        .collect();
    let mut plan = ConsensusPlan {
        path,
        contigs,
        absorbed: vec![],
        rewritten: vec![],
        dropped: vec![],
    };
    for other in touching {
        match relation(&graph.path(other), &plan.contigs) {
            Relation::Inside => plan.absorbed.push(other),
            Relation::Rewritable(pieces) => plan.rewritten.push((other, pieces)),
            Relation::Alternative if config.consensus_threshold < path_support(graph, other) => {
                return None
            }
            Relation::Alternative => plan.dropped.push(other),
        }
    }
    Some(plan)
}

fn apply_consensus(graph: &mut ContigGraph, plan: ConsensusPlan) -> Result<i64> {
    let seq = graph.path_sequence(&plan.contigs);
    let consensus = graph.add_contig(&seq)?;
    let mut attributes = Attributes::new();
    for &id in plan.contigs.iter() {
        merge_attributes(&mut attributes, graph.contig_attributes(id));
    }
    for &path in std::iter::once(&plan.path).chain(plan.absorbed.iter()) {
        merge_attributes(&mut attributes, graph.path_attributes(path));
    }
    let merged_from = nested_provenance(&plan.contigs, &mut attributes);
    attributes.insert(MERGED_FROM.to_string(), merged_from);
    for (key, value) in attributes {
        graph.set_contig_attribute(consensus, &key, value);
    }
    for (path, pieces) in plan.rewritten.iter() {
        let contigs: Vec<i64> = pieces
            .iter()
            .map(|piece| match piece {
                Piece::Contig(id) => *id,
                Piece::Consensus { reverse: false } => consensus,
                Piece::Consensus { reverse: true } => -consensus,
            })
            .collect();
        let path_attributes = graph.path_attributes(*path).clone();
        add_or_merge_path(graph, &contigs, &path_attributes)?;
    }
    let paths = std::iter::once(plan.path)
        .chain(plan.absorbed.iter().copied())
        .chain(plan.rewritten.iter().map(|x| x.0))
        .chain(plan.dropped.iter().copied());
    for path in paths {
        graph.delete_path(path);
    }
    for &id in plan.contigs.iter() {
        graph.delete_contig(id);
    }
    trace!("SIMPLIFY\tConsensus\t{}\t{}", consensus, provenance(&plan.contigs));
    Ok(consensus)
}

// Paths eligible to become a contig: two or more distinct, non-palindromic contigs.
fn is_simple(graph: &ContigGraph, contigs: &[i64]) -> bool {
    let distinct: HashSet<u64> = contigs.iter().map(|c| c.unsigned_abs()).collect();
    2 <= contigs.len()
        && distinct.len() == contigs.len()
        && contigs.iter().all(|&c| !graph.is_palindrome(c))
}

/// Replace each path supported by more than `consensus_threshold` reads by a new contig, most supported first.
/// Paths overlapping it only at its ends are rewritten to use the new contig, paths inside it are absorbed,
/// and unsupported alternatives are deleted. A path conflicting with a supported alternative is skipped.
/// Returns the number of created contigs.
pub fn consensus(graph: &mut ContigGraph, config: &SimplifyConfig) -> Result<usize> {
    let mut created = 0;
    let mut rejected: HashSet<i64> = HashSet::new();
    loop {
        let mut candidates: Vec<(u64, i64)> = graph
            .path_ids()
            .filter(|p| !rejected.contains(p))
            .filter(|&p| is_simple(graph, &graph.path(p)))
            .map(|p| (path_support(graph, p), p))
            .filter(|&(support, _)| config.consensus_threshold < support)
            .collect();
        candidates.sort_by(|x, y| y.0.cmp(&x.0).then(x.1.cmp(&y.1)));
        let mut plan = None;
        for &(_, path) in candidates.iter() {
            match plan_consensus(graph, path, config) {
                Some(found) => {
                    plan = Some(found);
                    break;
                }
                None => {
                    rejected.insert(path);
                }
            }
        }
        match plan {
            Some(plan) => {
                apply_consensus(graph, plan)?;
                created += 1;
                // A new contig may resolve earlier conflicts.
                rejected.clear();
            }
            None => break,
        }
    }
    debug!("SIMPLIFY\tConsensus\t{}", created);
    Ok(created)
}

/// Run every pass until none of them changes the graph.
pub fn simplify(graph: &mut ContigGraph, config: &SimplifyConfig) -> Result<SimplifyReport> {
    let mut report = SimplifyReport::default();
    loop {
        let generation = graph.generation();
        report.tips += trim_tips(graph, config);
        report.ambiguous_paths += resolve_ambiguous_paths(graph, config);
        report.merged += merge_nodes(graph)?;
        report.consensus += consensus(graph, config)?;
        if generation == graph.generation() {
            break;
        }
    }
    info!("SIMPLIFY\tReport\t{}", report);
    Ok(report)
}
