//! Call-recording collaborators shared by the unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::BoxError;
use crate::model::{Model, Parameter, StateDict};
use crate::optim::Optimizer;
use crate::tensor::{Tensor, Tensors};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Train,
    Eval,
    Forward { requires_grad: bool },
    Loss,
    Backward,
    ZeroGrad,
    Step,
}

pub type Log = Rc<RefCell<Vec<Event>>>;

/// Identity model with one scalar parameter. `backward` adds exactly 1.0 to
/// the gradient so gradient leakage across batches is visible.
pub struct StubModel {
    pub log: Log,
    pub param: Parameter,
    pub losses: VecDeque<f64>,
    pub default_loss: f64,
    pub last_targets: Vec<Tensor>,
    pub fail_forward: bool,
}

impl StubModel {
    pub fn new() -> (StubModel, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let model = StubModel {
            log: log.clone(),
            param: Parameter::new("w", Tensor::scalar(0.0)),
            losses: VecDeque::new(),
            default_loss: 0.25,
            last_targets: Vec::new(),
            fail_forward: false,
        };
        (model, log)
    }
}

impl Model for StubModel {
    fn forward(&mut self, inputs: &[Tensor]) -> Result<Tensors, BoxError> {
        if self.fail_forward {
            return Err("forward exploded".into());
        }
        self.log.borrow_mut().push(Event::Forward { requires_grad: inputs[0].requires_grad });
        Ok(inputs[0].clone().into())
    }

    fn loss(&mut self, _predictions: &[Tensor], targets: &[Tensor]) -> Result<f64, BoxError> {
        self.log.borrow_mut().push(Event::Loss);
        self.last_targets = targets.to_vec();
        Ok(self.losses.pop_front().unwrap_or(self.default_loss))
    }

    fn backward(&mut self) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Event::Backward);
        self.param.grad[0] += 1.0;
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.param]
    }

    fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        state.insert("w".into(), self.param.value.clone());
        state
    }

    fn load_state_dict(&mut self, mut state: StateDict) -> Result<(), BoxError> {
        self.param.value = state.remove("w").ok_or("missing w")?;
        Ok(())
    }

    fn train(&mut self) {
        self.log.borrow_mut().push(Event::Train);
    }

    fn eval(&mut self) {
        self.log.borrow_mut().push(Event::Eval);
    }
}

/// Records calls and the gradient it saw at each step.
pub struct StubOptimizer {
    pub log: Log,
    pub grads_at_step: Vec<f64>,
}

impl StubOptimizer {
    pub fn new(log: Log) -> StubOptimizer {
        StubOptimizer { log, grads_at_step: Vec::new() }
    }
}

impl Optimizer<StubModel> for StubOptimizer {
    fn zero_grad(&mut self, model: &mut StubModel) {
        self.log.borrow_mut().push(Event::ZeroGrad);
        model.param.zero_grad();
    }

    fn step(&mut self, model: &mut StubModel) -> Result<(), BoxError> {
        self.log.borrow_mut().push(Event::Step);
        self.grads_at_step.push(model.param.grad[0]);
        Ok(())
    }
}
