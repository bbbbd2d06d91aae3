use core::{
    future::Future,
    pin::{pin, Pin},
    task::{Context, Poll, Waker},
};

/// Gives the executor a chance to run something else. Completes on the second poll.
pub struct YieldFuture(bool);

pub fn yield_now() -> YieldFuture {
    YieldFuture(false)
}

impl Future for YieldFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.0 {
            true => Poll::Ready(()),
            false => {
                self.0 = true;
                ctx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

/// Polls `future` on the current thread until it completes.
pub fn block_run<T>(future: T) -> <T as Future>::Output
where
    T: Future,
{
    let mut future = pin!(future);
    let mut context = Context::from_waker(Waker::noop());

    loop {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(value) => return value,
            Poll::Pending => continue,
        }
    }
}

#[macro_export]
macro_rules! block_on {
    ($future:expr) => {
        $crate::block_run($future)
    };
}
