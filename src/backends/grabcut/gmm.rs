//! Full-covariance Gaussian mixture colour models

/// Number of mixture components per model
pub const COMPONENTS: usize = 5;

/// Lloyd iterations used to seed the components
const KMEANS_ITERATIONS: usize = 10;

/// Diagonal regularisation applied to singular covariances
const COVARIANCE_REGULARISATION: f64 = 0.01;

/// A colour sample as `[r, g, b]`
pub type Color = [f64; 3];

#[derive(Debug, Clone, Default)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: [[f64; 3]; 3],
    determinant: f64,
}

impl Component {
    /// Unweighted density of a colour under this component
    fn density(&self, color: Color) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }

        let d = [
            color[0] - self.mean[0],
            color[1] - self.mean[1],
            color[2] - self.mean[2],
        ];
        let mut mahalanobis = 0.0;
        for (i, row) in self.inverse.iter().enumerate() {
            mahalanobis += d[i] * (row[0] * d[0] + row[1] * d[1] + row[2] * d[2]);
        }

        (-0.5 * mahalanobis).exp() / self.determinant.sqrt()
    }
}

/// Running sums for one component during learning
#[derive(Debug, Clone, Default)]
struct Accumulator {
    count: usize,
    sum: Color,
    products: [[f64; 3]; 3],
}

impl Accumulator {
    fn add(&mut self, color: Color) {
        self.count += 1;
        for i in 0..3 {
            self.sum[i] += color[i];
            for j in 0..3 {
                self.products[i][j] += color[i] * color[j];
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(&self, total: usize) -> Component {
        if self.count == 0 || total == 0 {
            return Component::default();
        }

        let n = self.count as f64;
        let mean = [self.sum[0] / n, self.sum[1] / n, self.sum[2] / n];
        let mut covariance = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                covariance[i][j] = self.products[i][j] / n - mean[i] * mean[j];
            }
        }

        let mut determinant = determinant(&covariance);
        if determinant <= f64::EPSILON {
            for (i, row) in covariance.iter_mut().enumerate() {
                row[i] += COVARIANCE_REGULARISATION;
            }
            determinant = determinant_of(&covariance);
        }

        Component {
            weight: n / total as f64,
            mean,
            inverse: inverse(&covariance, determinant),
            determinant,
        }
    }
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

// Regularised covariances can still round to zero for constant samples
fn determinant_of(m: &[[f64; 3]; 3]) -> f64 {
    determinant(m).max(f64::MIN_POSITIVE)
}

fn inverse(m: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
        ],
    ]
}

fn distance_sq(a: Color, b: Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest(color: Color, centers: &[Color]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, center) in centers.iter().enumerate() {
        let distance = distance_sq(color, *center);
        if distance < best_distance {
            best_distance = distance;
            best = index;
        }
    }
    best
}

/// Deterministic k-means over colour samples
///
/// Centres start at evenly spaced quantiles of the samples ordered by
/// brightness, so repeated runs on the same input give the same clusters.
/// Returns a component index per sample.
fn kmeans(samples: &[Color], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&a, &b| {
        let sa = samples[a].iter().sum::<f64>();
        let sb = samples[b].iter().sum::<f64>();
        sa.total_cmp(&sb)
    });

    let mut centers: Vec<Color> = (0..k)
        .map(|i| samples[order[(2 * i + 1) * samples.len() / (2 * k)]])
        .collect();

    let mut labels = vec![0; samples.len()];
    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![[0.0; 3]; k];
        let mut counts = vec![0usize; k];

        for (label, sample) in labels.iter_mut().zip(samples) {
            *label = nearest(*sample, &centers);
            counts[*label] += 1;
            for c in 0..3 {
                sums[*label][c] += sample[c];
            }
        }

        #[allow(clippy::cast_precision_loss)]
        for i in 0..k {
            if counts[i] > 0 {
                let n = counts[i] as f64;
                centers[i] = [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n];
            }
        }
    }

    for (label, sample) in labels.iter_mut().zip(samples) {
        *label = nearest(*sample, &centers);
    }
    labels
}

/// Colour model made of up to [`COMPONENTS`] Gaussians
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    components: Vec<Component>,
}

impl GaussianMixture {
    /// Seed a mixture from samples with k-means
    ///
    /// Returns `None` when there are no samples.
    #[must_use]
    pub fn from_samples(samples: &[Color]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let k = COMPONENTS.min(samples.len());
        let labels = kmeans(samples, k);
        let mut mixture = Self {
            components: vec![Component::default(); COMPONENTS],
        };
        mixture.learn(samples, &labels);
        Some(mixture)
    }

    /// Index of the component that best explains a colour
    #[must_use]
    pub fn most_likely_component(&self, color: Color) -> usize {
        let mut best = 0;
        let mut best_density = f64::NEG_INFINITY;
        for (index, component) in self.components.iter().enumerate() {
            if component.weight <= 0.0 {
                continue;
            }
            let density = component.density(color);
            if density > best_density {
                best_density = density;
                best = index;
            }
        }
        best
    }

    /// Re-estimate every component from labelled samples
    ///
    /// Components that receive no samples get weight zero and are skipped when
    /// evaluating densities.
    pub fn learn(&mut self, samples: &[Color], labels: &[usize]) {
        let mut accumulators = vec![Accumulator::default(); COMPONENTS];
        for (sample, &label) in samples.iter().zip(labels) {
            if let Some(acc) = accumulators.get_mut(label) {
                acc.add(*sample);
            }
        }

        self.components = accumulators
            .iter()
            .map(|acc| acc.finish(samples.len()))
            .collect();
    }

    /// Reassign samples to their most likely components and re-learn
    pub fn refine(&mut self, samples: &[Color]) {
        let labels: Vec<usize> = samples
            .iter()
            .map(|&sample| self.most_likely_component(sample))
            .collect();
        self.learn(samples, &labels);
    }

    /// Mixture density of a colour
    #[must_use]
    pub fn probability(&self, color: Color) -> f64 {
        self.components
            .iter()
            .map(|component| component.weight * component.density(color))
            .sum()
    }

    /// `-ln p(color)`, finite even where the density underflows
    #[must_use]
    pub fn negative_log_likelihood(&self, color: Color) -> f64 {
        -self.probability(color).max(f64::MIN_POSITIVE).ln()
    }

    /// Number of components carrying weight
    #[must_use]
    pub fn active_components(&self) -> usize {
        self.components.iter().filter(|c| c.weight > 0.0).count()
    }
}
