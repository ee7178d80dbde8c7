use super::Bpe;
use std::{
    cmp::Ordering::{self, Equal},
    collections::{BinaryHeap, HashMap},
    fmt,
};

/// 一段文本的合词状态。
///
/// 每个符号以其在文本中的起始字节位置标识，`marks` 记录每个起始位置上的符号长度，
/// 待合并的相邻对按排名放在优先队列中。过期的合并项在出队时检查并丢弃，
/// 因此整个过程是 O(n log n) 的。
pub struct MergeState<'v, 't> {
    text: &'t str,
    bpe: &'v Bpe,
    marks: Vec<Mark>,
    merges: BinaryHeap<Merge>,
    /// (起始位置, 长度) -> 左半部分的长度，用于拆回不在词表中的合成片段
    splits: HashMap<(usize, usize), usize>,
}

pub struct Iter<'a> {
    marks: &'a [Mark],
    i: usize,
}

impl Bpe {
    /// 以单个字符作为初始符号，建立合词状态。
    pub fn begin_merge<'v, 't>(&'v self, text: &'t str) -> MergeState<'v, 't> {
        let mut marks = vec![Mark::EMPTY; text.len()];
        let mut merges = BinaryHeap::new();

        let mut last = None;
        for (i, c) in text.char_indices() {
            let len = c.len_utf8();
            marks[i].len = len as _;
            if let Some(pos) = last {
                let l0 = i - pos;
                marks[i].back_distance = l0 as _;
                if let Some(merge) = self.build_merge(text, pos, l0, len) {
                    merges.push(merge);
                }
            }
            last = Some(i);
        }

        MergeState {
            text,
            bpe: self,
            marks,
            merges,
            splits: HashMap::new(),
        }
    }

    fn build_merge(&self, text: &str, pos: usize, left: usize, right: usize) -> Option<Merge> {
        let mid = pos + left;
        self.ranks
            .rank_of(&text[pos..mid], &text[mid..mid + right])
            .map(|rank| Merge {
                pos,
                left: left as _,
                right: right as _,
                rank,
            })
    }
}

#[derive(Clone, Copy, Debug)]
struct Mark {
    /// 以此处为起点的符号长度，0 表示此处不是符号起点
    len: u32,
    /// 到前一个符号起点的距离，0 表示没有前一个符号
    back_distance: u32,
}

impl Mark {
    const EMPTY: Self = Self {
        len: 0,
        back_distance: 0,
    };
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Merge {
    pos: usize,
    left: u32,
    right: u32,
    rank: u32,
}
impl Ord for Merge {
    fn cmp(&self, other: &Self) -> Ordering {
        // 比较顺序：rank -> pos -> 长度
        match self.rank.cmp(&other.rank) {
            Equal => match self.pos.cmp(&other.pos) {
                Equal => (self.left, self.right).cmp(&(other.left, other.right)),
                other => other,
            },
            other => other,
        }
        .reverse()
    }
}
impl PartialOrd for Merge {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'t> MergeState<'_, 't> {
    /// 尝试执行一次合并，返回是否成功执行了一次合并。
    pub fn merge(&mut self) -> bool {
        // 一次合并将涉及至多 4 个符号：
        //
        // s0 s1 s2 s3
        // -- -- -- --
        //      ↓
        // s0 merge s3
        // -- ----- --
        //
        // 成功的合并将至少消费合并队列中的 1 个项，
        // 同时至多向合并队列添加 2 个项：
        //
        // s0 merge s3
        //    --------
        // --------

        // 从合并队列消费
        while let Some(Merge {
            pos: p1,
            left: l1,
            right: l2,
            ..
        }) = self.merges.pop()
        {
            // 确认合并项有效性
            if self.marks[p1].len != l1 {
                continue;
            }
            let p2 = p1 + l1 as usize;
            if self.marks[p2].len != l2 {
                continue;
            }
            // 合并
            let len = (l1 + l2) as usize;
            self.marks[p1].len = len as _;
            self.marks[p2].len = 0;
            self.splits.insert((p1, len), l1 as _);

            let p3 = p2 + l2 as usize;
            // 创建 merge + s3 合并项
            if let Some(mark) = self.marks.get_mut(p3) {
                mark.back_distance = len as _;
                let l3 = mark.len as usize;
                if let Some(merge) = self.bpe.build_merge(self.text, p1, len, l3) {
                    self.merges.push(merge);
                }
            }
            // 创建 s0 + merge 合并项
            match self.marks[p1].back_distance as usize {
                0 => {}
                l0 => {
                    let p0 = p1 - l0;
                    if let Some(merge) = self.bpe.build_merge(self.text, p0, l0, len) {
                        self.merges.push(merge);
                    }
                }
            }
            // 成功合并
            return true;
        }
        false
    }

    /// 遍历当前的所有符号，产生 `(起始位置, 长度)`。
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            marks: &self.marks,
            i: 0,
        }
    }

    #[inline]
    pub fn piece(&self, pos: usize, len: usize) -> &'t str {
        &self.text[pos..][..len]
    }

    /// 查询某个合成符号是由哪两部分合并而来的，返回左半部分的长度。
    #[inline]
    pub fn split_of(&self, pos: usize, len: usize) -> Option<usize> {
        self.splits.get(&(pos, len)).copied()
    }
}

impl Iterator for Iter<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        match self.marks.get(self.i) {
            Some(&Mark { len, .. }) => {
                let pos = self.i;
                self.i += len as usize;
                Some((pos, len as _))
            }
            None => None,
        }
    }
}

impl fmt::Display for MergeState<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "---------------------------")?;
        {
            writeln!(f, "text:")?;
            writeln!(f, "  {}", self.text)?;
        }
        writeln!(f, "---------------------------")?;
        {
            writeln!(f, "symbols:")?;
            for (pos, len) in self.iter() {
                let piece = self.piece(pos, len);
                match self.bpe.vocab.id_of(piece) {
                    Some(token) => writeln!(f, "  {token:>6}: {piece}")?,
                    None => writeln!(f, "       ?: {piece}")?,
                }
            }
        }
        writeln!(f, "---------------------------")?;
        {
            writeln!(f, "merges:")?;
            let mut merges = self.merges.clone();
            while let Some(Merge {
                pos,
                left,
                right,
                rank,
            }) = merges.pop()
            {
                let text = &self.text[pos..][..(left + right) as usize];
                writeln!(f, "  {rank:>6} | {text}")?;
            }
        }
        writeln!(f, "---------------------------")
    }
}
