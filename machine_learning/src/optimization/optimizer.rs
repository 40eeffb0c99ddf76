use crate::Result;

pub trait Optimizer {
    /// Updates `params` in place given the gradient of the loss with respect to them.
    ///
    /// # Errors
    /// If `params` and `grad` differ in length.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;
}
