//! The bridge that carries driver callbacks onto the embedder's own thread.
//!
//! OpenCL delivers build-completion and event-status callbacks on whatever
//! internal thread the driver chooses, with no guarantees about held locks
//! or runtime state. The trampolines here therefore do exactly one thing on
//! that thread: capture the arguments and enqueue them. The embedder's run
//! loop pumps the [`CallbackQueue`] and runs the caller-supplied callback on
//! the only thread where that is safe.

use std::ffi::c_void;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use log::error;

use crate::handle::{Handle, HandleKind};
use crate::sys::cl_int;

type Delivery = Box<dyn FnOnce() + Send>;

/// A completion notification as the caller's callback observes it.
pub struct Notification {
    /// Borrowed view of the resource the driver reported on; the caller
    /// already owns a reference through the handle it registered with.
    pub handle: Handle,
    /// Execution status for event-style callbacks; `None` for the
    /// build-completion style, which carries no status.
    pub status: Option<cl_int>,
}

/// Receiving end of the bridge, owned by the embedder's run loop.
///
/// The queue is deliberately not shareable: whichever thread pumps it is,
/// by definition, the callers' execution context.
pub struct CallbackQueue {
    tx: Sender<Delivery>,
    rx: Receiver<Delivery>,
}

impl CallbackQueue {
    /// Creates an empty queue.
    pub fn new() -> CallbackQueue {
        let (tx, rx) = mpsc::channel();
        CallbackQueue { tx, rx }
    }

    /// A cloneable producer side, handed to [`Notifier::arm`].
    pub fn sender(&self) -> CallbackSender {
        CallbackSender {
            tx: self.tx.clone(),
        }
    }

    /// Runs every pending callback on the current thread and returns how
    /// many were delivered.
    pub fn drain(&self) -> usize {
        let mut delivered = 0;
        while let Ok(delivery) = self.rx.try_recv() {
            delivery();
            delivered += 1;
        }
        delivered
    }

    /// Blocks up to `timeout` for one notification and delivers it on the
    /// current thread. Returns whether one was delivered.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(delivery) => {
                delivery();
                true
            }
            Err(_) => false,
        }
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of a [`CallbackQueue`]; safe to hold anywhere.
#[derive(Clone)]
pub struct CallbackSender {
    tx: Sender<Delivery>,
}

/// One armed driver callback registration.
///
/// The notifier is created immediately before the driver call that registers
/// it, travels into the driver as an opaque pointer, and is consumed exactly
/// once: either by the trampoline when the driver fires, or by
/// [`Notifier::cancel`] when the registering call failed synchronously and
/// the driver will never fire it.
pub struct Notifier {
    tx: Sender<Delivery>,
    kind: HandleKind,
    deliver: Box<dyn FnOnce(Notification) + Send>,
}

impl Notifier {
    /// Captures the caller's callback and user data and returns the opaque
    /// context pointer to register with the driver, together with one of the
    /// two trampolines below.
    ///
    /// `kind` is the kind of resource the driver will hand back, so the
    /// notification can carry a properly tagged handle.
    pub fn arm<D, F>(
        sender: &CallbackSender,
        kind: HandleKind,
        callback: F,
        user_data: D,
    ) -> *mut c_void
    where
        D: Send + 'static,
        F: FnOnce(Notification, D) + Send + 'static,
    {
        let notifier = Box::new(Notifier {
            tx: sender.tx.clone(),
            kind,
            deliver: Box::new(move |notification| callback(notification, user_data)),
        });
        Box::into_raw(notifier) as *mut c_void
    }

    /// Reclaims an armed notifier the driver will never invoke, dropping the
    /// captured callback and user data without running them.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`Notifier::arm`] and must not have been passed
    /// to a driver call that accepted it.
    pub unsafe fn cancel(ptr: *mut c_void) {
        if !ptr.is_null() {
            drop(Box::from_raw(ptr as *mut Notifier));
        }
    }

    /// Driver-facing entry point for callbacks that report a resource only
    /// (the `clBuildProgram` family).
    ///
    /// # Safety
    ///
    /// Called by the driver, on an arbitrary thread, with the pointer
    /// returned by [`Notifier::arm`]; at most once per registration.
    pub unsafe extern "system" fn trampoline(resource: *mut c_void, user_data: *mut c_void) {
        let notifier = Box::from_raw(user_data as *mut Notifier);
        notifier.signal(resource, None);
    }

    /// Driver-facing entry point for callbacks that report a resource plus
    /// an execution status (`clSetEventCallback`).
    ///
    /// # Safety
    ///
    /// Same contract as [`Notifier::trampoline`].
    pub unsafe extern "system" fn trampoline_status(
        resource: *mut c_void,
        status: cl_int,
        user_data: *mut c_void,
    ) {
        let notifier = Box::from_raw(user_data as *mut Notifier);
        notifier.signal(resource, Some(status));
    }

    // Runs on the driver's thread: wrap the arguments, enqueue, nothing
    // else. The callback itself belongs exclusively to the pumping thread.
    fn signal(self, resource: *mut c_void, status: Option<cl_int>) {
        let Notifier { tx, kind, deliver } = self;
        let notification = Notification {
            handle: Handle::wrap_borrowed(resource, kind),
            status,
        };
        if tx.send(Box::new(move || deliver(notification))).is_err() {
            error!(
                "callback queue is gone, dropping a {:?} notification",
                kind
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn fake_event() -> usize {
        0xE0E0_usize
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Tag(String);

    #[test]
    fn test_status_callback_delivers_once_on_the_pumping_thread() {
        let queue = CallbackQueue::new();
        let sender = queue.sender();

        let seen: Arc<Mutex<Vec<(Option<cl_int>, Tag, thread::ThreadId)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ctx = Notifier::arm(
            &sender,
            HandleKind::Event,
            move |notification: Notification, data: Tag| {
                assert_eq!(notification.handle.raw() as usize, fake_event());
                assert_eq!(notification.handle.kind_name(), "cl_event");
                sink.lock()
                    .unwrap()
                    .push((notification.status, data, thread::current().id()));
            },
            Tag("x".to_string()),
        ) as usize;

        let driver = thread::spawn(move || {
            unsafe {
                Notifier::trampoline_status(fake_event() as *mut _, -5, ctx as *mut _);
            }
            thread::current().id()
        });
        let driver_thread = driver.join().unwrap();

        assert!(
            seen.lock().unwrap().is_empty(),
            "callback must not run before the queue is pumped"
        );

        assert_eq!(queue.drain(), 1);
        let delivered = seen.lock().unwrap();
        assert_eq!(delivered.len(), 1, "delivered exactly once");
        let (status, tag, delivery_thread) = delivered[0].clone();
        assert_eq!(status, Some(-5), "status travels verbatim");
        assert_eq!(tag, Tag("x".to_string()), "user data travels intact");
        assert_eq!(delivery_thread, thread::current().id());
        assert_ne!(delivery_thread, driver_thread, "never on the driver thread");
        drop(delivered);

        assert_eq!(queue.drain(), 0, "nothing left after delivery");
    }

    #[test]
    fn test_resource_only_callback_carries_no_status() {
        let queue = CallbackQueue::new();
        let sender = queue.sender();

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let ctx = Notifier::arm(
            &sender,
            HandleKind::Program,
            move |notification: Notification, (): ()| {
                *sink.lock().unwrap() = Some((notification.status, notification.handle.kind()));
            },
            (),
        ) as usize;

        thread::spawn(move || unsafe {
            Notifier::trampoline(0x90_usize as *mut _, ctx as *mut _);
        })
        .join()
        .unwrap();

        assert!(queue.wait(Duration::from_secs(5)));
        assert_eq!(
            *seen.lock().unwrap(),
            Some((None, HandleKind::Program)),
            "build-style callbacks report the resource without a status"
        );
    }

    #[test]
    fn test_notification_handle_is_a_borrowed_view() {
        let queue = CallbackQueue::new();
        let sender = queue.sender();

        let ctx = Notifier::arm(
            &sender,
            HandleKind::Event,
            |notification: Notification, (): ()| {
                // Releasing a borrowed view must not reach the driver.
                assert!(notification.handle.release().is_ok());
            },
            (),
        );
        unsafe {
            Notifier::trampoline_status(fake_event() as *mut _, 0, ctx);
        }
        assert_eq!(queue.drain(), 1);
    }

    // Drop-tracking payload for the teardown paths.
    struct Payload(Arc<AtomicBool>);
    impl Drop for Payload {
        fn drop(&mut self) {
            self.0.store(true, SeqCst);
        }
    }

    #[test]
    fn test_signal_after_queue_teardown_drops_the_notification() {
        let queue = CallbackQueue::new();
        let sender = queue.sender();
        drop(queue);

        let invoked = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let ctx = Notifier::arm(
            &sender,
            HandleKind::Event,
            move |_notification: Notification, _data: Payload| {
                flag.store(true, SeqCst);
            },
            Payload(Arc::clone(&dropped)),
        );

        // Must not panic even though the receiving side is gone.
        unsafe {
            Notifier::trampoline_status(fake_event() as *mut _, -5, ctx);
        }

        assert!(!invoked.load(SeqCst), "no delivery target, no invocation");
        assert!(
            dropped.load(SeqCst),
            "the captured user data is released when delivery fails"
        );
    }

    #[test]
    fn test_cancel_drops_an_armed_notifier_without_invoking_it() {
        let queue = CallbackQueue::new();
        let sender = queue.sender();

        let invoked = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let ctx = Notifier::arm(
            &sender,
            HandleKind::Program,
            move |_notification: Notification, _data: Payload| {
                flag.store(true, SeqCst);
            },
            Payload(Arc::clone(&dropped)),
        );

        unsafe {
            Notifier::cancel(ctx);
        }

        assert_eq!(queue.drain(), 0, "a cancelled notifier enqueues nothing");
        assert!(!invoked.load(SeqCst));
        assert!(dropped.load(SeqCst), "cancel releases the captured resources");
    }

    #[test]
    fn test_deliveries_preserve_arrival_order() {
        let queue = CallbackQueue::new();
        let sender = queue.sender();

        let seen: Arc<Mutex<Vec<cl_int>>> = Arc::new(Mutex::new(Vec::new()));
        for status in [1, 2, 3] {
            let sink = Arc::clone(&seen);
            let ctx = Notifier::arm(
                &sender,
                HandleKind::Event,
                move |notification: Notification, (): ()| {
                    sink.lock().unwrap().push(notification.status.unwrap());
                },
                (),
            );
            unsafe {
                Notifier::trampoline_status(fake_event() as *mut _, status, ctx);
            }
        }

        assert_eq!(queue.drain(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
