use fleetrun::{Error, Interest, IoMap, Ready};
use std::cell::RefCell;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::time::{Duration, Instant};

fn pipe() -> (OwnedFd, OwnedFd) {
    let mut fds = [0 as RawFd; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "pipe failed");

    unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
}

fn write_all(fd: &OwnedFd, data: &[u8]) {
    let n = unsafe { libc::write(fd.as_raw_fd(), data.as_ptr() as *const _, data.len()) };
    assert_eq!(n, data.len() as isize);
}

fn drain(fd: RawFd) -> usize {
    let mut buf = [0u8; 256];
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
    n.max(0) as usize
}

#[test]
fn test_register_without_interest_fails() {
    let mut iomap = IoMap::new().unwrap();
    let (read, _write) = pipe();
    let fd = read.as_raw_fd();

    let result = iomap.register(fd, |_, _, _| Ok(()), Interest::new(false, false));

    assert!(matches!(result, Err(Error::NoInterest(f)) if f == fd));
    assert!(!iomap.contains(fd));
    assert!(iomap.is_empty());
}

#[test]
fn test_register_twice_fails_and_keeps_first_handler() {
    let mut iomap = IoMap::new().unwrap();
    let (read, write) = pipe();
    let fd = read.as_raw_fd();
    let calls = Rc::new(RefCell::new(Vec::new()));

    let first = calls.clone();
    iomap
        .register(
            fd,
            move |fd, _, _| {
                drain(fd);
                first.borrow_mut().push("first");
                Ok(())
            },
            Interest::READABLE,
        )
        .unwrap();

    let second = calls.clone();
    let result = iomap.register(
        fd,
        move |_, _, _| {
            second.borrow_mut().push("second");
            Ok(())
        },
        Interest::READABLE,
    );
    assert!(matches!(result, Err(Error::AlreadyRegistered(_))));
    assert_eq!(iomap.len(), 1);

    write_all(&write, b"x");
    let dispatched = iomap.poll(Some(Duration::from_secs(1))).unwrap();

    assert_eq!(dispatched, 1);
    assert_eq!(*calls.borrow(), vec!["first"]);
}

#[test]
fn test_unregister_unknown_fails() {
    let mut iomap = IoMap::new().unwrap();
    let (read, _write) = pipe();

    let result = iomap.unregister(read.as_raw_fd());

    assert!(matches!(result, Err(Error::NotRegistered(_))));
    assert!(result.unwrap_err().is_registration());
}

#[test]
fn test_unregister_removes_descriptor() {
    let mut iomap = IoMap::new().unwrap();
    let (read, write) = pipe();
    let fd = read.as_raw_fd();

    iomap.register(fd, |_, _, _| Ok(()), Interest::READABLE).unwrap();
    assert_eq!(iomap.interest(fd), Some(Interest::READABLE));

    iomap.unregister(fd).unwrap();
    assert!(!iomap.contains(fd));

    write_all(&write, b"ignored");
    assert_eq!(iomap.poll(Some(Duration::from_millis(20))).unwrap(), 0);

    // Registering again after unregistering is allowed.
    iomap.register(fd, |_, _, _| Ok(()), Interest::READABLE).unwrap();
    assert!(iomap.contains(fd));
}

#[test]
fn test_unregister_after_close_still_clears_entry() {
    let mut iomap = IoMap::new().unwrap();
    let (read, _write) = pipe();
    let fd = read.as_raw_fd();

    iomap.register(fd, |_, _, _| Ok(()), Interest::READABLE).unwrap();
    drop(read);

    iomap.unregister(fd).unwrap();
    assert!(!iomap.contains(fd));
    assert!(matches!(iomap.unregister(fd), Err(Error::NotRegistered(_))));

    // The number can be handed out again and registered afresh.
    let (again, _keep) = pipe();
    let fd = again.as_raw_fd();
    iomap.register(fd, |_, _, _| Ok(()), Interest::READABLE).unwrap();
    iomap.unregister(fd).unwrap();
    assert!(iomap.is_empty());
}

#[test]
fn test_poll_empty_waits_for_timeout() {
    let mut iomap = IoMap::new().unwrap();

    let start = Instant::now();
    let dispatched = iomap.poll(Some(Duration::from_millis(50))).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(dispatched, 0);
    assert!(elapsed >= Duration::from_millis(45), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");
}

#[test]
fn test_poll_dispatches_readable_descriptor() {
    let mut iomap = IoMap::new().unwrap();
    let (read, write) = pipe();
    let fd = read.as_raw_fd();
    let seen: Rc<RefCell<Vec<(RawFd, Ready, Vec<u8>)>>> = Rc::default();

    let log = seen.clone();
    iomap
        .register(
            fd,
            move |fd, ready, _| {
                let mut buf = [0u8; 16];
                let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut _, buf.len()) };
                log.borrow_mut().push((fd, ready, buf[..n as usize].to_vec()));
                Ok(())
            },
            Interest::READABLE,
        )
        .unwrap();

    write_all(&write, b"ping");
    let dispatched = iomap.poll(Some(Duration::from_secs(1))).unwrap();

    assert_eq!(dispatched, 1);
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, fd);
    assert!(seen[0].1.readable);
    assert!(!seen[0].1.writable);
    assert_eq!(seen[0].2, b"ping");
}

#[test]
fn test_poll_dispatches_writable_descriptor() {
    let mut iomap = IoMap::new().unwrap();
    let (_read, write) = pipe();
    let fd = write.as_raw_fd();
    let writable = Rc::new(RefCell::new(false));

    let flag = writable.clone();
    iomap
        .register(
            fd,
            move |fd, ready, iomap| {
                *flag.borrow_mut() = ready.writable;
                iomap.unregister(fd)
            },
            Interest::WRITABLE,
        )
        .unwrap();

    assert_eq!(iomap.poll(Some(Duration::from_secs(1))).unwrap(), 1);
    assert!(*writable.borrow());
    assert!(iomap.is_empty());
}

#[test]
fn test_handler_unregisters_itself_on_eof() {
    let mut iomap = IoMap::new().unwrap();
    let (read, write) = pipe();
    let fd = read.as_raw_fd();
    let hangups = Rc::new(RefCell::new(0));

    let count = hangups.clone();
    iomap
        .register(
            fd,
            move |fd, ready, iomap| {
                if drain(fd) == 0 {
                    assert!(ready.readable);
                    *count.borrow_mut() += 1;
                    iomap.unregister(fd)?;
                }
                Ok(())
            },
            Interest::READABLE,
        )
        .unwrap();

    write_all(&write, b"last words");
    drop(write);

    let deadline = Instant::now() + Duration::from_secs(2);
    while iomap.contains(fd) && Instant::now() < deadline {
        iomap.poll(Some(Duration::from_millis(100))).unwrap();
    }

    assert!(!iomap.contains(fd));
    assert_eq!(*hangups.borrow(), 1);
    assert_eq!(iomap.poll(Some(Duration::from_millis(10))).unwrap(), 0);
}

#[test]
fn test_descriptor_unregistered_during_dispatch_is_skipped() {
    let mut iomap = IoMap::new().unwrap();
    let (read_a, write_a) = pipe();
    let (read_b, write_b) = pipe();
    let fd_a = read_a.as_raw_fd();
    let fd_b = read_b.as_raw_fd();
    let calls = Rc::new(RefCell::new(0));

    for (fd, other) in [(fd_a, fd_b), (fd_b, fd_a)] {
        let calls = calls.clone();
        iomap
            .register(
                fd,
                move |fd, _, iomap| {
                    *calls.borrow_mut() += 1;
                    iomap.unregister(other)?;
                    iomap.unregister(fd)
                },
                Interest::READABLE,
            )
            .unwrap();
    }

    write_all(&write_a, b"a");
    write_all(&write_b, b"b");
    // Give both pipes time to be reported in the same batch.
    std::thread::sleep(Duration::from_millis(10));

    let dispatched = iomap.poll(Some(Duration::from_secs(1))).unwrap();

    assert_eq!(dispatched, 1);
    assert_eq!(*calls.borrow(), 1);
    assert!(iomap.is_empty());
}

#[test]
fn test_handler_error_propagates_from_poll() {
    let mut iomap = IoMap::new().unwrap();
    let (read, write) = pipe();
    let fd = read.as_raw_fd();

    iomap
        .register(
            fd,
            |_, _, iomap| iomap.register(-1, |_, _, _| Ok(()), Interest::new(false, false)),
            Interest::READABLE,
        )
        .unwrap();

    write_all(&write, b"boom");
    let result = iomap.poll(Some(Duration::from_secs(1)));

    assert!(matches!(result, Err(Error::NoInterest(-1))));
    // The failing handler stays registered.
    assert!(iomap.contains(fd));
}

#[test]
fn test_handler_can_register_new_descriptor() {
    let mut iomap = IoMap::new().unwrap();
    let (read_a, write_a) = pipe();
    let (read_b, write_b) = pipe();
    let fd_a = read_a.as_raw_fd();
    let fd_b = read_b.as_raw_fd();
    let order = Rc::new(RefCell::new(Vec::new()));

    let log = order.clone();
    iomap
        .register(
            fd_a,
            move |fd, _, iomap| {
                drain(fd);
                log.borrow_mut().push("a");
                iomap.unregister(fd)?;

                let log = log.clone();
                iomap.register(
                    fd_b,
                    move |fd, _, iomap| {
                        drain(fd);
                        log.borrow_mut().push("b");
                        iomap.unregister(fd)
                    },
                    Interest::READABLE,
                )
            },
            Interest::READABLE,
        )
        .unwrap();

    write_all(&write_a, b"1");
    write_all(&write_b, b"2");

    iomap.poll(Some(Duration::from_secs(1))).unwrap();
    assert!(iomap.contains(fd_b));

    iomap.poll(Some(Duration::from_secs(1))).unwrap();
    assert_eq!(*order.borrow(), vec!["a", "b"]);
    assert!(iomap.is_empty());
}
