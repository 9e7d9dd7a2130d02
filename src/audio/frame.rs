// The smallest unit of audio; one stereo frame
use std::ops::{Add, AddAssign, Mul};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self { // just giving `default` a better name for clarity
        Self::default()
    }

    pub fn mono(v: f32) -> Self {
        Self { left: v, right: v }
    }

    pub fn map(self, mut f: impl FnMut(f32) -> f32) -> Self {
        Self { left: f(self.left), right: f(self.right) }
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }

    pub fn peak(&self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}

impl Add for StereoFrame {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self { left: self.left + rhs.left, right: self.right + rhs.right }
    }
}

impl AddAssign for StereoFrame {
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl Mul<f32> for StereoFrame {
    type Output = Self;
    fn mul(self, g: f32) -> Self {
        Self { left: self.left * g, right: self.right * g }
    }
}
