use serde::{Deserialize, Serialize};

const EYE_WEIGHT: f64 = 1.0;
const NOSE_WEIGHT: f64 = 0.5;
const MOUTH_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacialFeatures {
    pub eyes: Vec<Region>,
    pub nose: Vec<Region>,
    pub mouth: Vec<Region>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymmetryGrade {
    Excellent,
    Good,
    Regular,
    Low,
    Deficient,
}

impl SymmetryGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            SymmetryGrade::Excellent
        } else if score >= 75.0 {
            SymmetryGrade::Good
        } else if score >= 65.0 {
            SymmetryGrade::Regular
        } else if score >= 55.0 {
            SymmetryGrade::Low
        } else {
            SymmetryGrade::Deficient
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SymmetryGrade::Excellent => "EXCELLENT",
            SymmetryGrade::Good => "GOOD",
            SymmetryGrade::Regular => "REGULAR",
            SymmetryGrade::Low => "LOW",
            SymmetryGrade::Deficient => "DEFICIENT",
        }
    }
}

impl std::fmt::Display for SymmetryGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Absence of an optional feature only removes its weighted term. Eyes are
// mandatory: with fewer than two detected eyes the score is 0.
pub fn symmetry_score(face: &Region, features: &FacialFeatures) -> f64 {
    if features.eyes.is_empty() {
        return 0.0;
    }

    let face_center_x = face.center_x();
    let mut terms: Vec<f64> = Vec::with_capacity(3);

    if features.eyes.len() >= 2 {
        let mut eyes = features.eyes.clone();
        eyes.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
        let left_dist = (eyes[0].center_x() - face_center_x).abs();
        let right_dist = (eyes[1].center_x() - face_center_x).abs();
        let spread = left_dist + right_dist;
        if spread > 0.0 {
            let term = 100.0 * (1.0 - (left_dist - right_dist).abs() / spread);
            terms.push(term * EYE_WEIGHT);
        }
    }

    if face_center_x > 0.0 {
        if let Some(nose) = features.nose.first() {
            let term = 100.0 * (1.0 - (nose.center_x() - face_center_x).abs() / face_center_x);
            terms.push(term * NOSE_WEIGHT);
        }

        if let Some(mouth) = features.mouth.first() {
            let term = 100.0 * (1.0 - (mouth.center_x() - face_center_x).abs() / face_center_x);
            terms.push(term * MOUTH_WEIGHT);
        }
    }

    if terms.is_empty() {
        0.0
    } else {
        terms.iter().sum::<f64>() / terms.len() as f64
    }
}
