use tracing::debug;
use worldline_core::{DenseOutput, Effect, Event, EventKind, Point};

/// Reverses selected coordinates when coordinate `index` crosses `level`.
///
/// The typical use is a bouncing body: the position coordinate crosses the
/// floor and the velocity coordinate is negated.
#[derive(Debug, Clone)]
pub struct Reflect {
    index: usize,
    level: f64,
    negate: Vec<usize>,
    max_hits: Option<usize>,
    hits: Vec<f64>,
}

impl Reflect {
    /// Creates a reflection at `y[index] = level` that negates the
    /// coordinates in `negate`.
    #[must_use]
    pub fn new(index: usize, level: f64, negate: impl IntoIterator<Item = usize>) -> Self {
        Self {
            index,
            level,
            negate: negate.into_iter().collect(),
            max_hits: None,
            hits: Vec::new(),
        }
    }

    /// Ends the run after the `max_hits`-th reflection.
    #[must_use]
    pub fn with_max_hits(self, max_hits: usize) -> Self {
        Self {
            max_hits: Some(max_hits),
            ..self
        }
    }

    /// Returns the times at which reflections were applied.
    #[must_use]
    pub fn hits(&self) -> &[f64] {
        &self.hits
    }
}

impl Event for Reflect {
    fn kind(&self) -> EventKind {
        EventKind::Modifying
    }

    fn is_terminal(&self) -> bool {
        self.max_hits.is_some_and(|max| self.hits.len() >= max)
    }

    fn value(&mut self, _t: f64, _dt: f64, y: &[f64], _dydt: &[f64]) -> f64 {
        y.get(self.index).map_or(f64::NAN, |y| y - self.level)
    }

    fn apply(&mut self, _dense: &dyn DenseOutput, point: &mut Point<'_>) -> Effect {
        for &i in &self.negate {
            if let Some(y) = point.y.get_mut(i) {
                *y = -*y;
            }
        }
        self.hits.push(point.t);
        debug!(t = point.t, hits = self.hits.len(), "reflected");
        Effect::StateChanged
    }
}
