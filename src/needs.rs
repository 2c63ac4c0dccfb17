use serde::Serialize;

const MAX: f32 = 100.0;

/// The dashboard's three bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Needs {
    pub food: f32,
    pub happiness: f32,
    pub walk: f32,
}

impl Default for Needs {
    fn default() -> Self {
        Self {
            food: 80.0,
            happiness: 90.0,
            walk: 40.0,
        }
    }
}

impl Needs {
    pub fn feed(&mut self) {
        self.food = (self.food + 20.0).min(MAX);
    }

    pub fn play(&mut self) {
        self.happiness = (self.happiness + 15.0).min(MAX);
    }

    pub fn walk(&mut self) {
        self.walk = (self.walk + 20.0).min(MAX);
    }

    /// One depletion tick (every 2 s).
    pub fn deplete(&mut self) {
        self.food = (self.food - 0.75).max(0.0);
        self.happiness = (self.happiness - 1.5).max(0.0);
        self.walk = (self.walk - 0.5).max(0.0);
    }
}
