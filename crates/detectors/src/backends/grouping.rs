//! Neighbour grouping of raw sliding-window hits

use vision_frame::BoundingBox;

/// Relative tolerance for two hits to count as neighbours
const EPS: f32 = 0.2;

fn similar(a: &BoundingBox, b: &BoundingBox) -> bool {
    let delta = EPS * (a.width.min(b.width) + a.height.min(b.height)) as f32 * 0.5;
    let close = |p: u32, q: u32| (p as f32 - q as f32).abs() <= delta;
    close(a.x, b.x)
        && close(a.y, b.y)
        && close(a.right(), b.right())
        && close(a.bottom(), b.bottom())
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Cluster overlapping hits and average each cluster.
///
/// Clusters with `min_neighbors` or fewer members are dropped. Returns the
/// averaged box, the member count and the best member score.
pub fn group_rectangles(
    hits: &[(BoundingBox, f32)],
    min_neighbors: usize,
) -> Vec<(BoundingBox, usize, f32)> {
    let n = hits.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&hits[i].0, &hits[j].0) {
                let a = find(&mut parent, i);
                let b = find(&mut parent, j);
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    // root -> (sum x, y, w, h, count, best score)
    let mut clusters: Vec<(usize, [u64; 4], usize, f32)> = Vec::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        let (bbox, score) = hits[i];
        let slot = match clusters.iter().position(|c| c.0 == root) {
            Some(pos) => pos,
            None => {
                clusters.push((root, [0; 4], 0, f32::MIN));
                clusters.len() - 1
            }
        };
        let cluster = &mut clusters[slot];
        cluster.1[0] += bbox.x as u64;
        cluster.1[1] += bbox.y as u64;
        cluster.1[2] += bbox.width as u64;
        cluster.1[3] += bbox.height as u64;
        cluster.2 += 1;
        cluster.3 = cluster.3.max(score);
    }

    clusters
        .into_iter()
        .filter(|(_, _, count, _)| *count > min_neighbors)
        .map(|(_, sums, count, best)| {
            let c = count as u64;
            let bbox = BoundingBox::new(
                (sums[0] / c) as u32,
                (sums[1] / c) as u32,
                (sums[2] / c) as u32,
                (sums[3] / c) as u32,
            );
            (bbox, count, best)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cluster_needs_more_than_min_neighbors() {
        let hits: Vec<(BoundingBox, f32)> = (0..4)
            .map(|i| (BoundingBox::new(100 + i, 100, 60, 60), 0.5))
            .collect();
        let grouped = group_rectangles(&hits, 3);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0, BoundingBox::new(101, 100, 60, 60));
        assert_eq!(grouped[0].1, 4);

        assert!(group_rectangles(&hits[..3], 3).is_empty());
    }

    #[test]
    fn test_distant_hits_stay_apart() {
        let mut hits = vec![(BoundingBox::new(0, 0, 60, 60), 0.4); 2];
        hits.extend(vec![(BoundingBox::new(300, 300, 60, 60), 0.9); 2]);
        let grouped = group_rectangles(&hits, 1);
        assert_eq!(grouped.len(), 2);
        assert!(grouped.iter().any(|g| g.2 == 0.9));
    }

    proptest! {
        #[test]
        fn prop_groups_never_exceed_hits(
            boxes in proptest::collection::vec((0u32..300, 0u32..300, 20u32..80), 0..30),
            min_neighbors in 0usize..4,
        ) {
            let hits: Vec<(BoundingBox, f32)> = boxes
                .iter()
                .map(|&(x, y, s)| (BoundingBox::new(x, y, s, s * 2), 0.5))
                .collect();
            let grouped = group_rectangles(&hits, min_neighbors);
            prop_assert!(grouped.len() <= hits.len());
            prop_assert_eq!(grouped.iter().map(|g| g.1).filter(|c| *c <= min_neighbors).count(), 0);
        }
    }
}
