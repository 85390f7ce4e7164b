//! Classical segmentation: iterated colour models and graph cuts
//!
//! A trimap is built from the prompt. With a box, pixels inside are
//! "probably foreground" and everything outside is fixed background. With
//! points only, the region is the convex hull of the foreground points grown
//! by a margin. Discs around each point are hard constraints. Each round
//! refits one colour mixture per side and recomputes the minimum cut of the
//! combined colour/smoothness energy. The output is strictly binary.

#![allow(clippy::indexing_slicing)]

use super::gmm::{Color, Gmm};
use super::graph::FlowGraph;
use super::hull::{convex_hull, distance_to_hull, Point};
use crate::config::SegmenterConfig;
use crate::error::Result;
use crate::types::{Mask, PointPrompt, Raster, SegmentationPrompt};
use tracing::{debug, trace};

/// Tuning for the classical strategy
#[derive(Debug, Clone, PartialEq)]
pub struct ClassicalParams {
    pub iterations: u32,
    pub components: usize,
    pub region_margin_ratio: f32,
    pub min_region_margin: u32,
    pub seed_radius: u32,
    pub smoothness: f32,
}

impl Default for ClassicalParams {
    fn default() -> Self {
        Self::from(&SegmenterConfig::default())
    }
}

impl From<&SegmenterConfig> for ClassicalParams {
    fn from(config: &SegmenterConfig) -> Self {
        Self {
            iterations: config.iterations.max(1),
            components: config.gmm_components.max(1),
            region_margin_ratio: config.region_margin_ratio,
            min_region_margin: config.min_region_margin,
            seed_radius: config.seed_radius,
            smoothness: config.smoothness,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trimap {
    Background,
    ProbableBackground,
    ProbableForeground,
    Foreground,
}

impl Trimap {
    fn is_fixed(self) -> bool {
        matches!(self, Self::Background | Self::Foreground)
    }

    fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground | Self::ProbableForeground)
    }
}

/// Graph-cut segmenter driven by points and/or a box
#[derive(Debug, Clone, Default)]
pub struct ClassicalSegmenter {
    params: ClassicalParams,
}

impl ClassicalSegmenter {
    #[must_use]
    pub fn new(params: ClassicalParams) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn params(&self) -> &ClassicalParams {
        &self.params
    }

    /// Segment the prompted object; the prompt must already be validated
    pub fn segment(&self, raster: &Raster, prompt: &SegmentationPrompt) -> Result<Mask> {
        let (width, height) = raster.dimensions();
        let (w, h) = (width as usize, height as usize);
        if w == 0 || h == 0 {
            return Ok(Mask::zeros(width, height));
        }

        let colors: Vec<Color> = raster
            .pixels()
            .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
            .collect();

        let mut trimap = self.initial_trimap(w, h, prompt);
        let region: Vec<usize> = (0..w * h)
            .filter(|&i| trimap[i] != Trimap::Background)
            .collect();

        if !region.iter().any(|&i| trimap[i].is_foreground()) {
            debug!("no foreground candidates inside the region of interest");
            return Ok(Mask::zeros(width, height));
        }

        let beta = contrast_beta(&colors, w, h);
        let gamma = f64::from(self.params.smoothness);
        let hard_cost = 9.0 * gamma + 1.0;
        debug!(
            region_pixels = region.len(),
            beta, gamma, "classical segmentation initialised"
        );

        let k = self.params.components;
        let (mut fg_model, mut bg_model) = {
            let (fg, bg) = split_samples(&colors, &trimap, w, h);
            let fg_labels = Gmm::kmeans_assignment(&fg, k);
            let bg_labels = Gmm::kmeans_assignment(&bg, k);
            match (Gmm::fit(&fg, &fg_labels, k), Gmm::fit(&bg, &bg_labels, k)) {
                (Some(f), Some(b)) => (f, b),
                _ => return Ok(trimap_to_mask(width, height, &trimap)),
            }
        };

        for round in 0..self.params.iterations {
            let (fg, bg) = split_samples(&colors, &trimap, w, h);
            let refit = (
                Gmm::fit(&fg, &fg_model.assign(&fg), k),
                Gmm::fit(&bg, &bg_model.assign(&bg), k),
            );
            match refit {
                (Some(f), Some(b)) => {
                    fg_model = f;
                    bg_model = b;
                },
                _ => break,
            }

            let source_side = self.cut(
                &colors, &trimap, &region, w, h, &fg_model, &bg_model, beta, gamma, hard_cost,
            );

            let mut changed = 0usize;
            for (node, &pixel) in region.iter().enumerate() {
                if trimap[pixel].is_fixed() {
                    continue;
                }
                let next = if source_side[node] {
                    Trimap::ProbableForeground
                } else {
                    Trimap::ProbableBackground
                };
                if next != trimap[pixel] {
                    trimap[pixel] = next;
                    changed += 1;
                }
            }
            trace!(round, changed, "graph cut round");
            if changed == 0 {
                break;
            }
        }

        Ok(trimap_to_mask(width, height, &trimap))
    }

    fn initial_trimap(&self, w: usize, h: usize, prompt: &SegmentationPrompt) -> Vec<Trimap> {
        let mut trimap = vec![Trimap::Background; w * h];

        if let Some(bbox) = &prompt.bbox {
            let (x1, y1) = (bbox.x_min as usize, bbox.y_min as usize);
            let (x2, y2) = ((bbox.x_max as usize).min(w), (bbox.y_max as usize).min(h));
            for y in y1..y2 {
                for x in x1..x2 {
                    trimap[y * w + x] = Trimap::ProbableForeground;
                }
            }
        } else {
            self.mark_hull_region(&mut trimap, w, h, prompt);
        }

        let r = self.params.seed_radius;
        for p in prompt.points.iter() {
            if !p.is_foreground() {
                continue;
            }
            for_each_in_disc(p, r, w, h, |i| {
                // Seeds outside the region of interest are ignored
                if trimap[i] != Trimap::Background {
                    trimap[i] = Trimap::Foreground;
                }
            });
        }
        for p in prompt.points.background() {
            for_each_in_disc(p, r, w, h, |i| trimap[i] = Trimap::Background);
        }

        trimap
    }

    fn mark_hull_region(
        &self,
        trimap: &mut [Trimap],
        w: usize,
        h: usize,
        prompt: &SegmentationPrompt,
    ) {
        let points: Vec<Point> = prompt
            .points
            .foreground()
            .filter(|p| (p.x as usize) < w && (p.y as usize) < h)
            .map(|p| (f64::from(p.x), f64::from(p.y)))
            .collect();
        if points.is_empty() {
            return;
        }

        let hull = convex_hull(&points);
        let longest = w.max(h) as f64;
        let margin = (f64::from(self.params.region_margin_ratio) * longest)
            .max(f64::from(self.params.min_region_margin));

        let (min_x, max_x) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.0), hi.max(p.0)));
        let (min_y, max_y) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.1), hi.max(p.1)));
        let x0 = (min_x - margin).floor().max(0.0) as usize;
        let x1 = ((max_x + margin).ceil() as usize).min(w - 1);
        let y0 = (min_y - margin).floor().max(0.0) as usize;
        let y1 = ((max_y + margin).ceil() as usize).min(h - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                if distance_to_hull(&hull, (x as f64, y as f64)) <= margin {
                    trimap[y * w + x] = Trimap::ProbableForeground;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn cut(
        &self,
        colors: &[Color],
        trimap: &[Trimap],
        region: &[usize],
        w: usize,
        h: usize,
        fg_model: &Gmm,
        bg_model: &Gmm,
        beta: f64,
        gamma: f64,
        hard_cost: f64,
    ) -> Vec<bool> {
        let mut node_of = vec![usize::MAX; w * h];
        for (node, &pixel) in region.iter().enumerate() {
            node_of[pixel] = node;
        }

        let mut graph = FlowGraph::new(region.len(), region.len() * 5);
        let diag = gamma / std::f64::consts::SQRT_2;
        let mut to_sink_extra = vec![0.0f64; region.len()];

        for (node, &pixel) in region.iter().enumerate() {
            let (x, y) = (pixel % w, pixel / w);
            let z = &colors[pixel];

            // 8-neighbourhood; each pair is visited from both ends, so only
            // neighbours with a higher index add an edge
            for (dx, dy, scale) in NEIGHBOURS {
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let q = ny as usize * w + nx as usize;
                let base = if scale > 1.0 { diag } else { gamma };
                let weight = base * (-beta * distance_sq(z, &colors[q])).exp();
                match node_of[q] {
                    usize::MAX => to_sink_extra[node] += weight,
                    other if other > node => graph.add_edge(node, other, weight),
                    _ => {},
                }
            }
        }

        for (node, &pixel) in region.iter().enumerate() {
            let (to_source, to_sink) = match trimap[pixel] {
                Trimap::Foreground => (hard_cost, 0.0),
                Trimap::Background => (0.0, hard_cost),
                Trimap::ProbableForeground | Trimap::ProbableBackground => {
                    let z = &colors[pixel];
                    (bg_model.neg_log_likelihood(z), fg_model.neg_log_likelihood(z))
                },
            };
            graph.add_terminal(node, to_source, to_sink + to_sink_extra[node]);
        }

        graph.min_cut()
    }
}

/// (dx, dy, distance) for the full 8-neighbourhood
const NEIGHBOURS: [(isize, isize, f64); 8] = [
    (-1, -1, std::f64::consts::SQRT_2),
    (0, -1, 1.0),
    (1, -1, std::f64::consts::SQRT_2),
    (-1, 0, 1.0),
    (1, 0, 1.0),
    (-1, 1, std::f64::consts::SQRT_2),
    (0, 1, 1.0),
    (1, 1, std::f64::consts::SQRT_2),
];

fn distance_sq(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// 1 / (2 * mean squared neighbour difference), 0 for flat images
fn contrast_beta(colors: &[Color], w: usize, h: usize) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for y in 0..h {
        for x in 0..w {
            let z = &colors[y * w + x];
            if x + 1 < w {
                sum += distance_sq(z, &colors[y * w + x + 1]);
                count += 1;
            }
            if y + 1 < h {
                sum += distance_sq(z, &colors[(y + 1) * w + x]);
                count += 1;
                if x + 1 < w {
                    sum += distance_sq(z, &colors[(y + 1) * w + x + 1]);
                    count += 1;
                }
                if x > 0 {
                    sum += distance_sq(z, &colors[(y + 1) * w + x - 1]);
                    count += 1;
                }
            }
        }
    }
    if count == 0 || sum <= 0.0 {
        0.0
    } else {
        1.0 / (2.0 * sum / count as f64)
    }
}

/// Colours currently labelled foreground / background
///
/// When nothing is labelled background (the region covers the whole image)
/// the image border stands in for the background model.
fn split_samples(colors: &[Color], trimap: &[Trimap], w: usize, h: usize) -> (Vec<Color>, Vec<Color>) {
    let mut fg = Vec::new();
    let mut bg = Vec::new();
    for (c, t) in colors.iter().zip(trimap) {
        if t.is_foreground() {
            fg.push(*c);
        } else {
            bg.push(*c);
        }
    }
    if bg.is_empty() {
        for y in 0..h {
            for x in 0..w {
                if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                    let i = y * w + x;
                    if trimap[i] != Trimap::Foreground {
                        bg.push(colors[i]);
                    }
                }
            }
        }
    }
    (fg, bg)
}

fn for_each_in_disc<F: FnMut(usize)>(p: &PointPrompt, radius: u32, w: usize, h: usize, mut f: F) {
    let (cx, cy) = (i64::from(p.x), i64::from(p.y));
    let r = i64::from(radius);
    for y in (cy - r).max(0)..=(cy + r).min(h as i64 - 1) {
        for x in (cx - r).max(0)..=(cx + r).min(w as i64 - 1) {
            if (x - cx).pow(2) + (y - cy).pow(2) <= r * r {
                f(y as usize * w + x as usize);
            }
        }
    }
}

fn trimap_to_mask(width: u32, height: u32, trimap: &[Trimap]) -> Mask {
    Mask::from_fn(width, height, |x, y| {
        let i = y as usize * width as usize + x as usize;
        if trimap[i].is_foreground() {
            1.0
        } else {
            0.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, PromptSet};
    use image::Rgba;

    fn square_scene(w: u32, h: u32, square: (u32, u32, u32, u32)) -> Raster {
        let (x0, y0, x1, y1) = square;
        Raster::from_fn(w, h, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 {
                Rgba([200, 40, 40, 255])
            } else {
                Rgba([40, 90, 200, 255])
            }
        })
    }

    fn small_params() -> ClassicalParams {
        ClassicalParams {
            min_region_margin: 8,
            region_margin_ratio: 0.3,
            ..ClassicalParams::default()
        }
    }

    #[test]
    fn test_point_prompt_recovers_square() {
        let raster = square_scene(60, 60, (20, 20, 40, 40));
        let prompt = SegmentationPrompt::from_points(
            PromptSet::new().with(PointPrompt::foreground(30, 30)),
        );
        let mask = ClassicalSegmenter::new(small_params())
            .segment(&raster, &prompt)
            .unwrap();

        assert!(mask.is_binary());
        assert_eq!(mask.get(30, 30), Some(1.0));
        assert_eq!(mask.get(21, 21), Some(1.0));
        assert_eq!(mask.get(5, 5), Some(0.0));
        assert_eq!(mask.get(45, 30), Some(0.0));
        assert_eq!(mask.count_at_least(0.5), 400);
    }

    #[test]
    fn test_box_prompt_recovers_square() {
        let raster = square_scene(60, 60, (20, 20, 40, 40));
        let prompt = SegmentationPrompt::from_box(BoundingBox::new(12, 12, 48, 48).unwrap());
        let mask = ClassicalSegmenter::new(small_params())
            .segment(&raster, &prompt)
            .unwrap();
        assert_eq!(mask.count_at_least(0.5), 400);
        assert_eq!(mask.get(13, 13), Some(0.0));
    }

    #[test]
    fn test_background_point_is_hard_constraint() {
        let raster = square_scene(60, 60, (20, 20, 40, 40));
        let prompt = SegmentationPrompt::from_points(
            PromptSet::new()
                .with(PointPrompt::foreground(30, 30))
                .with(PointPrompt::background(35, 35)),
        );
        let params = ClassicalParams {
            seed_radius: 2,
            ..small_params()
        };
        let mask = ClassicalSegmenter::new(params).segment(&raster, &prompt).unwrap();
        assert_eq!(mask.get(35, 35), Some(0.0));
        assert_eq!(mask.get(30, 30), Some(1.0));
    }

    #[test]
    fn test_uniform_image_terminates() {
        let raster = Raster::filled(32, 24, [128, 128, 128, 255]);
        let prompt = SegmentationPrompt::from_points(
            PromptSet::new().with(PointPrompt::foreground(16, 12)),
        );
        let mask = ClassicalSegmenter::default().segment(&raster, &prompt).unwrap();
        assert!(mask.is_binary());
        assert_eq!(mask.dimensions(), (32, 24));
        assert_eq!(mask.get(16, 12), Some(1.0));
    }

    #[test]
    fn test_region_covering_whole_image_uses_border() {
        let raster = square_scene(20, 20, (6, 6, 14, 14));
        let prompt = SegmentationPrompt::from_box(BoundingBox::new(0, 0, 20, 20).unwrap());
        let mask = ClassicalSegmenter::default().segment(&raster, &prompt).unwrap();
        assert!(mask.is_binary());
        assert_eq!(mask.dimensions(), (20, 20));
    }

    #[test]
    fn test_deterministic() {
        let raster = Raster::from_fn(40, 30, |x, y| {
            Rgba([(x * 6) as u8, (y * 8) as u8, ((x + y) * 3) as u8, 255])
        });
        let prompt = SegmentationPrompt::from_points(
            PromptSet::new()
                .with(PointPrompt::foreground(20, 15))
                .with(PointPrompt::foreground(25, 12))
                .with(PointPrompt::background(2, 2)),
        );
        let seg = ClassicalSegmenter::default();
        let a = seg.segment(&raster, &prompt).unwrap();
        let b = seg.segment(&raster, &prompt).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_contrast_beta_flat_is_zero() {
        let colors = vec![[5.0, 5.0, 5.0]; 12];
        assert!(contrast_beta(&colors, 4, 3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_seed_outside_box_gives_empty_mask() {
        let raster = Raster::filled(60, 60, [120, 120, 120, 255]);
        let prompt = SegmentationPrompt {
            points: PromptSet::new().with(PointPrompt::foreground(55, 55)),
            bbox: Some(BoundingBox::new(5, 5, 20, 20).unwrap()),
        };
        let mask = ClassicalSegmenter::default().segment(&raster, &prompt).unwrap();
        assert_eq!(mask.dimensions(), (60, 60));
        assert_eq!(mask.get(55, 55), Some(0.0));
        assert_eq!(mask.count_at_least(0.5), 0);
    }

    #[test]
    fn test_prompts_outside_raster_stop_early() {
        let raster = square_scene(30, 20, (10, 5, 20, 15));
        let prompt = SegmentationPrompt::from_points(
            PromptSet::new()
                .with(PointPrompt::foreground(80, 80))
                .with(PointPrompt::background(3, 3)),
        );
        let mask = ClassicalSegmenter::default().segment(&raster, &prompt).unwrap();
        assert_eq!(mask, Mask::zeros(30, 20));
    }
}
