//! One stepping handle per locally simulated role

use tandem_core::{
    DkgParams, EngineResult, MpcEngine, Participant, SessionContext, SignParams, SignatureFormat,
    StepOutput,
};

/// A protocol handle the strategies can advance without knowing whether it
/// runs DKG or signing.
pub trait Stepper: Send {
    /// Role this handle plays
    fn role(&self) -> Participant;

    /// Whether the handle has reported completion
    fn is_done(&self) -> bool;

    /// Advance one round with an optional inbound frame
    fn step(&mut self, inbound: Option<&[u8]>) -> EngineResult<StepOutput>;

    /// Whether the first step needs a frame from the peer.
    ///
    /// When only one role is local, a handle that answers the peer's opening
    /// message must wait for it instead of stepping empty-handed.
    fn awaits_peer_first(&self) -> bool {
        false
    }
}

/// DKG handle bound to its session context
pub struct DkgStepper<'c, E: MpcEngine> {
    ctx: &'c SessionContext<E>,
    handle: E::Dkg,
    role: Participant,
    done: bool,
}

impl<'c, E: MpcEngine> DkgStepper<'c, E> {
    /// Start a DKG run for `params.role`
    pub fn new(ctx: &'c SessionContext<E>, params: &DkgParams) -> EngineResult<Self> {
        let handle = ctx.engine().dkg_new(ctx.raw(), params)?;
        Ok(Self {
            ctx,
            handle,
            role: params.role,
            done: false,
        })
    }

    /// Consume the completed run into a key share
    pub fn finalize(self) -> EngineResult<E::Keypair> {
        self.ctx.engine().dkg_finalize(self.ctx.raw(), self.handle)
    }
}

impl<'c, E: MpcEngine> Stepper for DkgStepper<'c, E> {
    fn role(&self) -> Participant {
        self.role
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn step(&mut self, inbound: Option<&[u8]>) -> EngineResult<StepOutput> {
        let output = self
            .ctx
            .engine()
            .dkg_step(self.ctx.raw(), &mut self.handle, inbound)?;
        self.done = output.done;
        Ok(output)
    }
}

/// Signing handle with its message already fixed
pub struct SignStepper<'c, E: MpcEngine> {
    ctx: &'c SessionContext<E>,
    handle: E::Sign,
    role: Participant,
    done: bool,
}

impl<'c, E: MpcEngine> SignStepper<'c, E> {
    /// Start a signing run over `keypair` and set `message` before any step
    pub fn new(
        ctx: &'c SessionContext<E>,
        role: Participant,
        keypair: &E::Keypair,
        params: &SignParams,
        message: &[u8],
    ) -> EngineResult<Self> {
        let engine = ctx.engine();
        let mut handle = engine.sign_new(ctx.raw(), keypair, params)?;
        engine.sign_set_message(ctx.raw(), &mut handle, message)?;
        tracing::debug!(%role, bytes = message.len(), "sign message set");
        Ok(Self {
            ctx,
            handle,
            role,
            done: false,
        })
    }

    /// Consume the completed run into a signature
    pub fn finalize(self, format: SignatureFormat) -> EngineResult<Option<Vec<u8>>> {
        self.ctx
            .engine()
            .sign_finalize(self.ctx.raw(), self.handle, format)
    }
}

impl<'c, E: MpcEngine> Stepper for SignStepper<'c, E> {
    fn role(&self) -> Participant {
        self.role
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn step(&mut self, inbound: Option<&[u8]>) -> EngineResult<StepOutput> {
        let output = self
            .ctx
            .engine()
            .sign_step(self.ctx.raw(), &mut self.handle, inbound)?;
        self.done = output.done;
        Ok(output)
    }

    // The server opens a signing run; the device answers.
    fn awaits_peer_first(&self) -> bool {
        self.role == Participant::Device
    }
}
