//! Length-limited canonical code construction.
//!
//! Symbols are sorted by descending count, a Huffman tree is built with two
//! queues (leaves and internal nodes), and code lengths over the limit are
//! shortened by borrowing from cheaper ranks until the Kraft sum balances.

use vepar_core::{Error, Result};

use super::{HuffmanCode, HUF_TABLELOG_MAX, HUF_TABLELOG_MIN};
use crate::bits::highbit32;

const NODES_LEN: usize = 512;
const NO_SYMBOL: u32 = 0xF0F0_F0F0;

#[derive(Debug, Clone, Copy, Default)]
struct Node {
    count: u32,
    parent: u16,
    symbol: u8,
    nb_bits: u8,
}

/// Table log for `src_len` bytes over `symbol_len` symbols.
pub fn optimal_table_log(max_log: u8, src_len: usize, symbol_len: usize) -> u8 {
    let src_len = src_len.max(2) as u32;
    let symbol_len = symbol_len.max(2) as u32;
    let max_bits_src = highbit32(src_len - 1) as i32 - 1;
    let min_bits = (highbit32(src_len) + 1).min(highbit32(symbol_len - 1) + 2) as u8;

    let mut table_log = max_log;
    if max_bits_src >= 0 && (max_bits_src as u8) < table_log {
        table_log = max_bits_src as u8;
    }
    if min_bits > table_log {
        table_log = min_bits;
    }
    table_log.clamp(HUF_TABLELOG_MIN, HUF_TABLELOG_MAX)
}

/// Stable sort by descending count: bucket by magnitude, insertion sort
/// inside each bucket.
fn sort_nodes(hist: &[u32], nodes: &mut [Node]) {
    let mut base = [0u32; 34];
    for &c in hist {
        base[(highbit32(c + 1) + 1) as usize] += 1;
    }
    for n in (0..33).rev() {
        base[n] += base[n + 1];
    }
    let mut current = base;
    for (symbol, &c) in hist.iter().enumerate() {
        let r = (highbit32(c + 1) + 2) as usize;
        let mut pos = current[r] as usize;
        current[r] += 1;
        while pos > base[r] as usize && c > nodes[pos - 1].count {
            nodes[pos] = nodes[pos - 1];
            pos -= 1;
        }
        nodes[pos] = Node {
            count: c,
            parent: 0,
            symbol: symbol as u8,
            nb_bits: 0,
        };
    }
}

/// Cap code lengths at `max_nb_bits`, returning the final largest length.
///
/// `nodes[..=last_non_null]` are the sorted leaves with their unbounded
/// depths.
fn set_max_height(nodes: &mut [Node], last_non_null: usize, max_nb_bits: u8) -> u8 {
    let largest_bits = nodes[last_non_null].nb_bits;
    if largest_bits <= max_nb_bits {
        return largest_bits;
    }

    let mut total_cost: i32 = 0;
    let base_cost = 1i32 << (largest_bits - max_nb_bits);
    let mut n = last_non_null as isize;
    while nodes[n as usize].nb_bits > max_nb_bits {
        total_cost += base_cost - (1i32 << (largest_bits - nodes[n as usize].nb_bits));
        nodes[n as usize].nb_bits = max_nb_bits;
        n -= 1;
    }
    while nodes[n as usize].nb_bits == max_nb_bits {
        n -= 1;
    }
    // n is the smallest symbol using fewer than max_nb_bits.
    total_cost >>= largest_bits - max_nb_bits;

    let mut rank_last = [NO_SYMBOL; HUF_TABLELOG_MAX as usize + 2];
    let mut current = max_nb_bits;
    for pos in (0..=n).rev() {
        let bits = nodes[pos as usize].nb_bits;
        if bits >= current {
            continue;
        }
        current = bits;
        rank_last[(max_nb_bits - current) as usize] = pos as u32;
    }

    while total_cost > 0 {
        let mut to_decrease = highbit32(total_cost as u32) as usize + 1;
        while to_decrease > 1 {
            let high = rank_last[to_decrease];
            let low = rank_last[to_decrease - 1];
            if high == NO_SYMBOL {
                to_decrease -= 1;
                continue;
            }
            if low == NO_SYMBOL {
                break;
            }
            if nodes[high as usize].count <= 2 * nodes[low as usize].count {
                break;
            }
            to_decrease -= 1;
        }
        while to_decrease <= HUF_TABLELOG_MAX as usize && rank_last[to_decrease] == NO_SYMBOL {
            to_decrease += 1;
        }
        total_cost -= 1 << (to_decrease - 1);
        if rank_last[to_decrease - 1] == NO_SYMBOL {
            rank_last[to_decrease - 1] = rank_last[to_decrease];
        }
        let pos = rank_last[to_decrease] as usize;
        nodes[pos].nb_bits += 1;
        if pos == 0 {
            rank_last[to_decrease] = NO_SYMBOL;
        } else {
            rank_last[to_decrease] -= 1;
            let next = rank_last[to_decrease] as usize;
            if nodes[next].nb_bits as i32 != max_nb_bits as i32 - to_decrease as i32 {
                rank_last[to_decrease] = NO_SYMBOL;
            }
        }
    }

    // The repayment can overshoot; hand single bits back.
    while total_cost < 0 {
        if rank_last[1] == NO_SYMBOL {
            while nodes[n as usize].nb_bits == max_nb_bits {
                n -= 1;
            }
            nodes[(n + 1) as usize].nb_bits -= 1;
            rank_last[1] = (n + 1) as u32;
            total_cost += 1;
            continue;
        }
        let pos = rank_last[1] as usize + 1;
        nodes[pos].nb_bits -= 1;
        rank_last[1] += 1;
        total_cost += 1;
    }
    max_nb_bits
}

/// Build per-symbol codes for `hist`, at most `max_bits` long.
///
/// `hist` must hold at least two non-zero counts and end with a non-zero
/// count. Returns the codes and the table log actually used.
pub fn build_codes(hist: &[u32], max_bits: u8) -> Result<(Vec<HuffmanCode>, u8)> {
    let symbol_len = hist.len();
    if symbol_len < 2 || symbol_len > 256 {
        return Err(Error::InvalidState {
            expected: "between 2 and 256 symbols",
            actual: "histogram outside that range",
        });
    }
    // nodes[0] is a barrier; leaves and parents follow at offset 1.
    let mut buf = vec![Node::default(); NODES_LEN + 1];
    sort_nodes(hist, &mut buf[1..]);

    let start = symbol_len;
    let mut non_null = symbol_len - 1;
    while buf[non_null + 1].count == 0 {
        if non_null == 0 {
            return Err(Error::InvalidState {
                expected: "two present symbols",
                actual: "empty histogram",
            });
        }
        non_null -= 1;
    }
    if non_null == 0 {
        return Err(Error::InvalidState {
            expected: "two present symbols",
            actual: "single symbol",
        });
    }

    let node = |i: isize| (i + 1) as usize;
    let mut low_s = non_null as isize;
    let root = start + non_null - 1;
    let mut low_n = start as isize;
    let mut next = start;

    buf[node(next as isize)].count =
        buf[node(low_s)].count + buf[node(low_s - 1)].count;
    buf[node(low_s)].parent = next as u16;
    buf[node(low_s - 1)].parent = next as u16;
    next += 1;
    low_s -= 2;
    for n in next..=root {
        buf[node(n as isize)].count = 1 << 30;
    }
    buf[0].count = 1 << 31;

    while next <= root {
        let mut pick = || {
            if buf[node(low_s)].count < buf[node(low_n)].count {
                low_s -= 1;
                low_s + 1
            } else {
                low_n += 1;
                low_n - 1
            }
        };
        let n1 = pick();
        let n2 = pick();
        buf[node(next as isize)].count = buf[node(n1)].count + buf[node(n2)].count;
        buf[node(n1)].parent = next as u16;
        buf[node(n2)].parent = next as u16;
        next += 1;
    }

    let nodes = &mut buf[1..];
    nodes[root].nb_bits = 0;
    for n in (start..root).rev() {
        nodes[n].nb_bits = nodes[nodes[n].parent as usize].nb_bits + 1;
    }
    for n in 0..=non_null {
        nodes[n].nb_bits = nodes[nodes[n].parent as usize].nb_bits + 1;
    }

    let table_log = set_max_height(nodes, non_null, max_bits);
    if table_log > HUF_TABLELOG_MAX {
        return Err(Error::InvalidState {
            expected: "code lengths within the table log",
            actual: "longer code",
        });
    }

    let mut nb_per_rank = [0u16; HUF_TABLELOG_MAX as usize + 1];
    for v in &nodes[..=non_null] {
        nb_per_rank[v.nb_bits as usize] += 1;
    }
    let mut val_per_rank = [0u16; HUF_TABLELOG_MAX as usize + 1];
    let mut min = 0u16;
    for n in (1..=table_log as usize).rev() {
        val_per_rank[n] = min;
        min += nb_per_rank[n];
        min >>= 1;
    }

    let mut codes = vec![HuffmanCode::default(); symbol_len];
    for v in &nodes[..=non_null] {
        codes[v.symbol as usize].nb_bits = v.nb_bits;
    }
    for code in codes.iter_mut() {
        if code.nb_bits == 0 {
            continue;
        }
        let rank = &mut val_per_rank[code.nb_bits as usize];
        code.code = *rank;
        *rank += 1;
    }
    Ok((codes, table_log))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kraft(codes: &[HuffmanCode], table_log: u8) -> u64 {
        codes
            .iter()
            .filter(|c| c.nb_bits > 0)
            .map(|c| 1u64 << (table_log - c.nb_bits))
            .sum()
    }

    #[test]
    fn test_sort_is_stable_descending() {
        let hist = [5u32, 9, 0, 5, 100, 1];
        let mut nodes = vec![Node::default(); 8];
        sort_nodes(&hist, &mut nodes);
        let order: Vec<u8> = nodes[..6].iter().map(|n| n.symbol).collect();
        assert_eq!(order, vec![4, 1, 0, 3, 5, 2]);
    }

    #[test]
    fn test_two_symbols() {
        let (codes, tl) = build_codes(&[10, 3], 11).unwrap();
        assert_eq!(tl, 1);
        assert_eq!(codes[0].nb_bits, 1);
        assert_eq!(codes[1].nb_bits, 1);
        assert_ne!(codes[0].code, codes[1].code);
    }

    #[test]
    fn test_kraft_equality() {
        let hist: Vec<u32> = (0..40u32).map(|i| (i * 37 % 11) + 1 + i / 3).collect();
        let (codes, tl) = build_codes(&hist, 11).unwrap();
        assert_eq!(kraft(&codes, tl), 1 << tl);
    }

    #[test]
    fn test_length_limit_enforced() {
        // Fibonacci counts force a degenerate tree far deeper than 11.
        let mut hist = vec![1u32, 1];
        while hist.len() < 30 {
            let n = hist.len();
            hist.push(hist[n - 1] + hist[n - 2]);
        }
        let (codes, tl) = build_codes(&hist, 11).unwrap();
        assert_eq!(tl, 11);
        assert!(codes.iter().all(|c| c.nb_bits >= 1 && c.nb_bits <= 11));
        assert_eq!(kraft(&codes, tl), 1 << tl);
        // more frequent never gets a longer code
        assert!(codes[29].nb_bits <= codes[0].nb_bits);
    }

    #[test]
    fn test_codes_are_prefix_free() {
        let hist = [50u32, 20, 20, 5, 3, 1, 1];
        let (codes, tl) = build_codes(&hist, 11).unwrap();
        let expanded: Vec<(u32, u32)> = codes
            .iter()
            .map(|c| {
                let shift = (tl - c.nb_bits) as u32;
                ((c.code as u32) << shift, ((c.code as u32) + 1) << shift)
            })
            .collect();
        for (i, a) in expanded.iter().enumerate() {
            for b in &expanded[i + 1..] {
                assert!(a.1 <= b.0 || b.1 <= a.0);
            }
        }
    }

    #[test]
    fn test_optimal_table_log() {
        assert_eq!(optimal_table_log(11, 100_000, 256), 11);
        assert_eq!(optimal_table_log(11, 40, 4), 5);
        assert_eq!(optimal_table_log(11, 1000, 200), 9);
    }
}
