//! Canonical Huffman code construction.
//!
//! A code is described by its symbol alphabet and the bit length of each
//! symbol's code word. Canonicalization assigns the unique code words that
//! follow from those lengths: codes are handed out in ascending
//! `(length, symbol)` order, starting at zero and incrementing, shifting
//! left whenever the length grows. Decoding walks the accumulated bit value
//! across the distinct lengths and matches against a dense
//! code-value-to-symbol table.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::fmt::Debug;

use htx_core::bits::{BitReader, BitWriter};
use htx_core::error::{HtxError, Result};
use std::io::{Read, Write};

/// Longest permitted code word. Codes are accumulated in a u32 during
/// decode and the container format caps them at 31 bits.
pub const MAX_CODE_LENGTH: u32 = 31;

/// A symbol that can be Huffman-coded: totally ordered, cheap to copy.
pub trait HuffmanSymbol: Copy + Ord + Debug {
    fn as_i64(self) -> i64;
}

impl HuffmanSymbol for i32 {
    fn as_i64(self) -> i64 {
        i64::from(self)
    }
}

impl HuffmanSymbol for u8 {
    fn as_i64(self) -> i64 {
        i64::from(self)
    }
}

/// Alphabet plus per-symbol code-word bit lengths, aligned 1:1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanParams<T> {
    symbols: Vec<T>,
    code_lengths: Vec<u32>,
}

impl<T: HuffmanSymbol> HuffmanParams<T> {
    pub fn new(symbols: Vec<T>, code_lengths: Vec<u32>) -> Result<Self> {
        if symbols.is_empty() {
            return Err(HtxError::invalid_parameters("huffman", "empty alphabet"));
        }
        if symbols.len() != code_lengths.len() {
            return Err(HtxError::invalid_parameters(
                "huffman",
                format!(
                    "{} symbols but {} code lengths",
                    symbols.len(),
                    code_lengths.len()
                ),
            ));
        }
        if let Some(max) = code_lengths.iter().max() {
            if *max > MAX_CODE_LENGTH {
                return Err(HtxError::invalid_parameters(
                    "huffman",
                    format!("code length {} exceeds {} bits", max, MAX_CODE_LENGTH),
                ));
            }
        }
        // A zero length is only meaningful for a single-symbol alphabet.
        if symbols.len() > 1 && code_lengths.contains(&0) {
            return Err(HtxError::invalid_parameters(
                "huffman",
                "zero code length in a multi-symbol alphabet",
            ));
        }
        let mut unique = symbols.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != symbols.len() {
            return Err(HtxError::invalid_parameters(
                "huffman",
                "duplicate symbol in alphabet",
            ));
        }
        Ok(Self {
            symbols,
            code_lengths,
        })
    }

    /// Build lengths from a symbol frequency table using the classic
    /// two-queue construction. A single-symbol alphabet gets length 0.
    pub fn from_frequencies(frequencies: &BTreeMap<T, u64>) -> Result<Self> {
        let leaves: Vec<(T, u64)> = frequencies
            .iter()
            .map(|(&s, &f)| (s, f))
            .filter(|&(_, f)| f > 0)
            .collect();
        if leaves.is_empty() {
            return Err(HtxError::invalid_parameters(
                "huffman",
                "no symbol has a non-zero frequency",
            ));
        }
        if leaves.len() == 1 {
            return HuffmanParams::new(vec![leaves[0].0], vec![0]);
        }

        struct Node {
            weight: u64,
            // Leaf index into `leaves`, or child node indexes.
            leaf: Option<usize>,
            children: Option<(usize, usize)>,
        }

        let mut arena: Vec<Node> = Vec::with_capacity(leaves.len() * 2);
        let mut sorted: Vec<(usize, u64)> = leaves
            .iter()
            .enumerate()
            .map(|(i, &(_, f))| (i, f))
            .collect();
        sorted.sort_by_key(|&(i, f)| (f, i));

        let mut leaf_queue: VecDeque<usize> = VecDeque::with_capacity(leaves.len());
        for (leaf_index, weight) in sorted {
            arena.push(Node {
                weight,
                leaf: Some(leaf_index),
                children: None,
            });
            leaf_queue.push_back(arena.len() - 1);
        }
        let mut inner_queue: VecDeque<usize> = VecDeque::new();

        // Pop the lighter front of the two queues, twice, and push the
        // combined node; leaves win ties so lengths stay minimal.
        let pop_lightest = |leaf_queue: &mut VecDeque<usize>,
                            inner_queue: &mut VecDeque<usize>,
                            arena: &Vec<Node>| {
            match (leaf_queue.front(), inner_queue.front()) {
                (Some(&l), Some(&n)) => {
                    if arena[l].weight <= arena[n].weight {
                        leaf_queue.pop_front().unwrap()
                    } else {
                        inner_queue.pop_front().unwrap()
                    }
                }
                (Some(_), None) => leaf_queue.pop_front().unwrap(),
                (None, Some(_)) => inner_queue.pop_front().unwrap(),
                (None, None) => unreachable!("queues exhausted before the tree was rooted"),
            }
        };

        while leaf_queue.len() + inner_queue.len() > 1 {
            let a = pop_lightest(&mut leaf_queue, &mut inner_queue, &arena);
            let b = pop_lightest(&mut leaf_queue, &mut inner_queue, &arena);
            arena.push(Node {
                weight: arena[a].weight + arena[b].weight,
                leaf: None,
                children: Some((a, b)),
            });
            inner_queue.push_back(arena.len() - 1);
        }
        let root = inner_queue.pop_front().expect("tree has a root");

        // Leaf depth equals code length.
        let mut lengths = vec![0u32; leaves.len()];
        let mut stack = vec![(root, 0u32)];
        while let Some((node, depth)) = stack.pop() {
            if let Some(leaf_index) = arena[node].leaf {
                lengths[leaf_index] = depth;
            }
            if let Some((a, b)) = arena[node].children {
                stack.push((a, depth + 1));
                stack.push((b, depth + 1));
            }
        }

        let symbols = leaves.iter().map(|&(s, _)| s).collect();
        HuffmanParams::new(symbols, lengths)
    }

    pub fn symbols(&self) -> &[T] {
        &self.symbols
    }

    pub fn code_lengths(&self) -> &[u32] {
        &self.code_lengths
    }
}

#[derive(Debug, Clone)]
struct CodeWord<T> {
    symbol: T,
    code: u32,
    length: u32,
}

/// Canonical code words derived from a `HuffmanParams`, with the encode and
/// decode tables built once up front.
#[derive(Debug, Clone)]
pub struct CanonicalCodes<T> {
    // Sorted by (length, code); assignment order.
    codes: Vec<CodeWord<T>>,
    // Distinct code lengths, ascending.
    lengths: Vec<u32>,
    // Sorted by symbol for encode lookup.
    by_symbol: Vec<(T, u32, u32)>,
    // Dense code-value -> index into `codes`. Canonical code values are
    // strictly increasing across the whole code, so values never collide.
    lookup: Vec<Option<u32>>,
}

impl<T: HuffmanSymbol> CanonicalCodes<T> {
    pub fn new(params: &HuffmanParams<T>) -> Result<Self> {
        let mut order: Vec<(u32, T)> = params
            .code_lengths
            .iter()
            .zip(params.symbols.iter())
            .map(|(&l, &s)| (l, s))
            .collect();
        order.sort();

        let mut codes: Vec<CodeWord<T>> = Vec::with_capacity(order.len());
        let mut code: u32 = 0;
        let mut current_length = order[0].0;
        for &(length, symbol) in &order {
            if length > current_length {
                code <<= length - current_length;
                current_length = length;
            }
            // An over-full set of lengths eventually produces a code that no
            // longer fits in its own bit length.
            if current_length < 32 && code >> current_length != 0 {
                return Err(HtxError::InvalidCodeLengths);
            }
            codes.push(CodeWord {
                symbol,
                code,
                length: current_length,
            });
            code = code.wrapping_add(1);
        }

        let mut lengths: Vec<u32> = codes.iter().map(|c| c.length).collect();
        lengths.dedup();

        let mut by_symbol: Vec<(T, u32, u32)> =
            codes.iter().map(|c| (c.symbol, c.code, c.length)).collect();
        by_symbol.sort_by_key(|&(s, _, _)| s);

        let max_code = codes.iter().map(|c| c.code).max().unwrap_or(0);
        let mut lookup = vec![None; max_code as usize + 1];
        for (i, c) in codes.iter().enumerate() {
            lookup[c.code as usize] = Some(i as u32);
        }

        Ok(Self {
            codes,
            lengths,
            by_symbol,
            lookup,
        })
    }

    /// True when the alphabet has one symbol and therefore a zero-bit code.
    pub fn is_zero_bit(&self) -> bool {
        self.codes.len() == 1 && self.codes[0].length == 0
    }

    pub fn write_symbol<W: Write>(&self, bits: &mut BitWriter<W>, symbol: T) -> Result<()> {
        let i = self
            .by_symbol
            .binary_search_by_key(&symbol, |&(s, _, _)| s)
            .map_err(|_| HtxError::SymbolNotInAlphabet {
                symbol: symbol.as_i64(),
            })?;
        let (_, code, length) = self.by_symbol[i];
        bits.write_bits(code, length)
    }

    /// Read one symbol, never consuming more bits than the longest code
    /// word. Accumulates bits and tests the value at each length boundary.
    pub fn read_symbol<R: Read>(&self, bits: &mut BitReader<R>) -> Result<T> {
        if self.is_zero_bit() {
            return Ok(self.codes[0].symbol);
        }
        let mut value: u32 = 0;
        let mut consumed: u32 = 0;
        for &length in &self.lengths {
            value = (value << (length - consumed)) | bits.read_bits(length - consumed)?;
            consumed = length;
            if let Some(Some(i)) = self.lookup.get(value as usize) {
                let c = &self.codes[*i as usize];
                if c.length == length {
                    return Ok(c.symbol);
                }
            }
        }
        Err(HtxError::Corrupt(
            "bit pattern matches no huffman code word".into(),
        ))
    }
}
