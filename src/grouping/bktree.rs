//! BK木（離散距離空間の近傍探索インデックス）

use crate::model::Fingerprint;
use std::collections::BTreeMap;

/// 2つのキーの距離
pub trait Metric<K> {
    fn distance(&self, a: &K, b: &K) -> u32;
}

impl<K, F> Metric<K> for F
where
    F: Fn(&K, &K) -> u32,
{
    fn distance(&self, a: &K, b: &K) -> u32 {
        self(a, b)
    }
}

/// 指紋のハミング距離
#[derive(Debug, Default, Clone, Copy)]
pub struct Hamming;

impl Metric<Fingerprint> for Hamming {
    fn distance(&self, a: &Fingerprint, b: &Fingerprint) -> u32 {
        a.distance(b)
    }
}

#[derive(Debug)]
struct Node<K> {
    key: K,
    /// 親からの距離 → 子ノードの添字
    children: BTreeMap<u32, usize>,
}

/// ノードは挿入順に配列へ置き、子は距離ごとに1つだけ持つ
#[derive(Debug)]
pub struct BkTree<K, M> {
    nodes: Vec<Node<K>>,
    metric: M,
}

impl<K, M: Metric<K>> BkTree<K, M> {
    pub fn new(metric: M) -> Self {
        Self {
            nodes: Vec::new(),
            metric,
        }
    }

    pub fn insert(&mut self, key: K) {
        let new_index = self.nodes.len();
        if self.nodes.is_empty() {
            self.nodes.push(Node {
                key,
                children: BTreeMap::new(),
            });
            return;
        }

        let mut current = 0;
        loop {
            let d = self.metric.distance(&self.nodes[current].key, &key);
            match self.nodes[current].children.get(&d) {
                Some(&child) => current = child,
                None => {
                    self.nodes[current].children.insert(d, new_index);
                    break;
                }
            }
        }
        self.nodes.push(Node {
            key,
            children: BTreeMap::new(),
        });
    }

    /// `query` から距離 `radius` 以内（境界を含む）のキーをすべて返す
    ///
    /// 距離の昇順、同じ距離なら挿入順。
    pub fn find(&self, query: &K, radius: u32) -> Vec<(u32, &K)> {
        if self.nodes.is_empty() {
            return Vec::new();
        }

        let mut found: Vec<(u32, usize)> = Vec::new();

        let mut stack = vec![0];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            let d = self.metric.distance(&node.key, query);
            if d <= radius {
                found.push((d, index));
            }

            // 三角不等式より |d - r| ..= d + r の子だけ調べればよい
            let lower = d.saturating_sub(radius);
            let upper = d.saturating_add(radius);
            stack.extend(node.children.range(lower..=upper).map(|(_, &child)| child));
        }

        found.sort_unstable();
        found
            .into_iter()
            .map(|(d, index)| (d, &self.nodes[index].key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<K, M: Metric<K>> Extend<K> for BkTree<K, M> {
    fn extend<I: IntoIterator<Item = K>>(&mut self, iter: I) {
        for key in iter {
            self.insert(key);
        }
    }
}
