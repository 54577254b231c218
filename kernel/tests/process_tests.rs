//! Process creation, hierarchy, exit and reaping

mod shared_kernel;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kernel::{
    BootError, FileHandle, Kernel, KernelConfig, ProcessError, ProcessId, ProcessState, Task, WaitTarget,
};
use shared_kernel::{boot, boot_with, task, yield_until, ClosingStream};
use spin::Mutex;

#[test]
fn test_boot_returns_init_exit_value() {
    let result = boot(|k, _| {
        assert_eq!(k.current_pid(), ProcessId::INIT);
        assert_eq!(k.parent_pid(), None);

        let idle = k.process_info(ProcessId::IDLE).unwrap();
        assert_eq!(idle.parent, None);
        assert_eq!(idle.state, ProcessState::Alive);
        assert_eq!(k.process_count(), 2);
        3
    });
    assert_eq!(result, Ok(3));
}

#[test]
fn test_boot_args_reach_init() {
    shared_kernel::init_logging();
    let kernel = Kernel::new(KernelConfig::default().with_max_proc(8));
    let init = Task::new(|_, args| args.map_or(-1, |args| args.len() as i32));
    assert_eq!(kernel.boot(init, Some(&b"four"[..])), Ok(4));
}

#[test]
fn test_wait_reaps_child() {
    let result = boot(|k, _| {
        let child = k
            .create_process(Some(task(|k, _| {
                assert_eq!(k.parent_pid(), Some(ProcessId::INIT));
                k.terminate_process(17)
            })), None)
            .unwrap();
        assert_eq!(child, ProcessId::new(2));
        assert_eq!(k.process_info(ProcessId::INIT).unwrap().children, 1);

        assert_eq!(k.wait_child(WaitTarget::Pid(child)), Ok((child, 17)));
        assert!(k.process_info(child).is_none());
        assert_eq!(k.wait_child(WaitTarget::Pid(child)), Err(ProcessError::InvalidPid));
        assert_eq!(k.process_info(ProcessId::INIT).unwrap().children, 0);
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_task_return_is_exit_value() {
    let result = boot(|k, _| {
        let child = k.create_process(Some(task(|_, _| 23)), None).unwrap();
        let (pid, value) = k.wait_child(WaitTarget::Any).unwrap();
        assert_eq!((pid, value), (child, 23));
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_wait_rejects_bad_targets() {
    let result = boot_with(KernelConfig::default().with_max_proc(8), |k, _| {
        assert_eq!(k.wait_child(WaitTarget::Any), Err(ProcessError::NoChild));
        assert_eq!(k.wait_child(WaitTarget::Pid(ProcessId::new(100))), Err(ProcessError::InvalidPid));
        assert_eq!(k.wait_child(WaitTarget::Pid(ProcessId::new(5))), Err(ProcessError::InvalidPid));
        assert_eq!(k.wait_child(WaitTarget::Pid(ProcessId::IDLE)), Err(ProcessError::NotMyChild));
        assert_eq!(k.wait_child(WaitTarget::Pid(ProcessId::INIT)), Err(ProcessError::NotMyChild));
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_grandchild_is_not_my_child() {
    let release = Arc::new(AtomicBool::new(false));
    let grandchild = Arc::new(Mutex::new(None));

    let (r, g) = (Arc::clone(&release), Arc::clone(&grandchild));
    let result = boot(move |k, _| {
        let (r2, g2) = (Arc::clone(&r), Arc::clone(&g));
        let child = k
            .create_process(Some(task(move |k, _| {
                let r3 = Arc::clone(&r2);
                let pid = k
                    .create_process(Some(task(move |k, _| {
                        yield_until(k, || r3.load(Ordering::SeqCst));
                        5
                    })), None)
                    .unwrap();
                *g2.lock() = Some(pid);
                let (_, value) = k.wait_child(WaitTarget::Pid(pid)).unwrap();
                value
            })), None)
            .unwrap();

        yield_until(k, || g.lock().is_some());
        let pid = g.lock().unwrap();
        assert_eq!(k.wait_child(WaitTarget::Pid(pid)), Err(ProcessError::NotMyChild));
        assert_eq!(k.process_info(pid).unwrap().parent, Some(child));

        r.store(true, Ordering::SeqCst);
        assert_eq!(k.wait_child(WaitTarget::Pid(child)), Ok((child, 5)));
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_orphans_are_adopted_by_init() {
    let release = Arc::new(AtomicBool::new(false));
    let orphan = Arc::new(Mutex::new(None));

    let (r, o) = (Arc::clone(&release), Arc::clone(&orphan));
    let result = boot(move |k, _| {
        let (r2, o2) = (Arc::clone(&r), Arc::clone(&o));
        let parent = k
            .create_process(Some(task(move |k, _| {
                let r3 = Arc::clone(&r2);
                let pid = k
                    .create_process(Some(task(move |k, _| {
                        yield_until(k, || r3.load(Ordering::SeqCst));
                        assert_eq!(k.parent_pid(), Some(ProcessId::INIT));
                        9
                    })), None)
                    .unwrap();
                *o2.lock() = Some(pid);
                k.terminate_process(1)
            })), None)
            .unwrap();

        assert_eq!(k.wait_child(WaitTarget::Pid(parent)), Ok((parent, 1)));
        let pid = o.lock().unwrap();
        let info = k.process_info(pid).unwrap();
        assert_eq!(info.parent, Some(ProcessId::INIT));
        assert_eq!(info.state, ProcessState::Alive);

        r.store(true, Ordering::SeqCst);
        assert_eq!(k.wait_child(WaitTarget::Any), Ok((pid, 9)));
        assert_eq!(k.wait_child(WaitTarget::Any), Err(ProcessError::NoChild));
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_zombie_orphans_are_handed_to_init() {
    let result = boot(|k, _| {
        let parent = k
            .create_process(Some(task(|k, _| {
                let child = k.create_process(Some(task(|_, _| 4)), None).unwrap();
                yield_until(k, || {
                    k.process_info(child).map(|info| info.state) == Some(ProcessState::Zombie)
                });
                assert_eq!(k.process_info(k.current_pid()).unwrap().zombies, 1);
                0
            })), None)
            .unwrap();

        assert_eq!(k.wait_child(WaitTarget::Pid(parent)), Ok((parent, 0)));
        let init = k.process_info(ProcessId::INIT).unwrap();
        assert_eq!((init.children, init.zombies), (1, 1));
        let (_, value) = k.wait_child(WaitTarget::Any).unwrap();
        assert_eq!(value, 4);
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_init_drains_children_before_exit() {
    let ran = Arc::new(AtomicBool::new(false));

    shared_kernel::init_logging();
    let kernel = Kernel::new(KernelConfig::default().with_max_proc(8));
    let flag = Arc::clone(&ran);
    let init = Task::new(move |k, _| {
        let flag = Arc::clone(&flag);
        k.create_process(Some(task(move |k, _| {
            for _ in 0..3 {
                k.yield_now();
            }
            flag.store(true, Ordering::SeqCst);
            4
        })), None)
        .unwrap();
        0
    });

    assert_eq!(kernel.boot(init, None), Ok(0));
    assert!(ran.load(Ordering::SeqCst));
    // idle and the unreaped init remain
    assert_eq!(kernel.process_count(), 2);
    let init = kernel.process_info(ProcessId::INIT).unwrap();
    assert_eq!(init.state, ProcessState::Zombie);
    assert_eq!(init.exit_value, Some(0));
    assert_eq!(init.children, 0);
}

#[test]
fn test_any_reaps_in_exit_order() {
    let result = boot(|k, _| {
        let slow = k
            .create_process(Some(task(|k, _| {
                for _ in 0..4 {
                    k.yield_now();
                }
                2
            })), None)
            .unwrap();
        let fast = k.create_process(Some(task(|_, _| 1)), None).unwrap();

        assert_eq!(k.wait_child(WaitTarget::Any), Ok((fast, 1)));
        assert_eq!(k.wait_child(WaitTarget::Any), Ok((slow, 2)));
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_freed_slots_are_reused_last_first() {
    let result = boot(|k, _| {
        let pids: Vec<ProcessId> = (0..3)
            .map(|_| k.create_process(Some(task(|_, _| 0)), None).unwrap())
            .collect();
        assert_eq!(pids, [ProcessId::new(2), ProcessId::new(3), ProcessId::new(4)]);

        for &pid in &[pids[0], pids[2], pids[1]] {
            k.wait_child(WaitTarget::Pid(pid)).unwrap();
        }

        assert_eq!(k.create_process(None, None), Ok(ProcessId::new(3)));
        assert_eq!(k.create_process(None, None), Ok(ProcessId::new(4)));
        assert_eq!(k.create_process(None, None), Ok(ProcessId::new(2)));
        assert_eq!(k.create_process(None, None), Ok(ProcessId::new(5)));
        0
    });
    // the threadless children never exit, so init's drain cannot finish
    assert!(matches!(result, Err(BootError::Stalled(_))));
}

#[test]
fn test_pool_exhaustion_is_reported() {
    let result = boot_with(KernelConfig::default().with_max_proc(4), |k, _| {
        k.create_process(Some(task(|_, _| 0)), None).unwrap();
        k.create_process(Some(task(|_, _| 0)), None).unwrap();
        assert_eq!(k.process_count(), 4);
        assert_eq!(
            k.create_process(Some(task(|_, _| 0)), None),
            Err(ProcessError::ResourceExhausted)
        );
        assert_eq!(k.process_count(), 4);
        assert_eq!(k.process_info(ProcessId::INIT).unwrap().children, 2);

        k.wait_child(WaitTarget::Any).unwrap();
        let pid = k.create_process(Some(task(|_, _| 0)), None).unwrap();
        assert_eq!(k.process_count(), 4);
        k.wait_child(WaitTarget::Any).unwrap();
        k.wait_child(WaitTarget::Any).unwrap();
        assert!(k.process_info(pid).is_none());
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_last_thread_exit_equals_terminate() {
    let result = boot(|k, _| {
        let by_exit = k.create_process(Some(task(|k, _| k.exit_thread(5))), None).unwrap();
        let by_terminate = k
            .create_process(Some(task(|k, _| k.terminate_process(5))), None)
            .unwrap();

        for pid in [by_exit, by_terminate] {
            yield_until(k, || {
                k.process_info(pid).map(|info| info.state) == Some(ProcessState::Zombie)
            });
        }
        let a = k.process_info(by_exit).unwrap();
        let b = k.process_info(by_terminate).unwrap();
        assert_eq!((a.state, a.exit_value, a.threads), (b.state, b.exit_value, b.threads));
        assert_eq!(a.exit_value, Some(5));

        assert_eq!(k.wait_child(WaitTarget::Pid(by_exit)), Ok((by_exit, 5)));
        assert_eq!(k.wait_child(WaitTarget::Pid(by_terminate)), Ok((by_terminate, 5)));
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_process_args_are_copied() {
    let result = boot(|k, _| {
        let received: Arc<Mutex<Option<Arc<[u8]>>>> = Arc::new(Mutex::new(None));
        let data = b"argument bytes".to_vec();

        let slot = Arc::clone(&received);
        let child = k
            .create_process(Some(task(move |_, args| {
                *slot.lock() = args;
                0
            })), Some(data.as_slice()))
            .unwrap();
        k.wait_child(WaitTarget::Pid(child)).unwrap();

        let args = received.lock().clone().unwrap();
        assert_eq!(&*args, data.as_slice());
        assert_ne!(args.as_ptr(), data.as_ptr());
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_children_inherit_handles() {
    let (stream, closed) = ClosingStream::new();
    let handle = FileHandle::new(stream);

    let h = handle.clone();
    let c = Arc::clone(&closed);
    let result = boot(move |k, _| {
        assert_eq!(k.install_handle(h.clone()), Ok(0));
        assert_eq!(h.refcount(), 1);

        let child = k
            .create_process(Some(task(|k, _| {
                assert_eq!(k.open_handles(), 1);
                0
            })), None)
            .unwrap();
        assert_eq!(h.refcount(), 2);
        assert_eq!(k.process_info(child).unwrap().open_fds, 1);

        assert_eq!(k.close_handle(0), Ok(()));
        assert_eq!(k.close_handle(0), Err(kernel::FdError::BadFid));
        assert_eq!(h.refcount(), 1);
        assert!(!c.load(Ordering::SeqCst));

        k.wait_child(WaitTarget::Pid(child)).unwrap();
        assert_eq!(h.refcount(), 0);
        assert!(c.load(Ordering::SeqCst));
        0
    });
    assert_eq!(result, Ok(0));
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_exit_releases_open_handles() {
    let (stream, closed) = ClosingStream::new();
    let handle = FileHandle::new(stream);

    let h = handle.clone();
    let result = boot(move |k, _| {
        let h = h.clone();
        let child = k
            .create_process(Some(task(move |k, _| {
                k.install_handle(h.clone()).unwrap();
                k.install_handle(h.clone()).unwrap();
                assert_eq!(h.refcount(), 2);
                0
            })), None)
            .unwrap();
        k.wait_child(WaitTarget::Pid(child)).unwrap();
        0
    });
    assert_eq!(result, Ok(0));
    assert_eq!(handle.refcount(), 0);
    assert!(closed.load(Ordering::SeqCst));
}

#[test]
fn test_process_table_snapshot() {
    let result = boot(|k, _| {
        let child = k.create_process(Some(task(|_, _| 0)), None).unwrap();
        let table = k.process_table();
        let pids: Vec<ProcessId> = table.iter().map(|info| info.pid).collect();
        assert_eq!(pids, [ProcessId::IDLE, ProcessId::INIT, child]);

        let init = &table[1];
        assert_eq!(init.threads, 1);
        assert_eq!(init.children, 1);
        assert_eq!(table[2].parent, Some(ProcessId::INIT));

        k.wait_child(WaitTarget::Any).unwrap();
        assert_eq!(k.process_table().len(), 2);
        0
    });
    assert_eq!(result, Ok(0));
}

#[test]
fn test_boot_requires_idle_host() {
    shared_kernel::init_logging();
    let kernel = Kernel::new(KernelConfig::default().with_max_proc(8));
    let remote = Arc::clone(&kernel);
    let result = std::thread::spawn(move || remote.boot(Task::new(|_, _| 0), None))
        .join()
        .unwrap();
    assert_eq!(result, Err(BootError::WrongHost));
    assert_eq!(kernel.process_count(), 0);
}

#[test]
fn test_second_boot_is_refused() {
    shared_kernel::init_logging();
    let kernel = Kernel::new(KernelConfig::default().with_max_proc(8));
    assert_eq!(kernel.boot(Task::new(|_, _| 1), None), Ok(1));
    assert_eq!(
        kernel.boot(Task::new(|_, _| 1), None),
        Err(BootError::IdlePid(ProcessId::new(2)))
    );
}

#[test]
fn test_boot_fails_without_room_for_init() {
    let result = boot_with(KernelConfig::default().with_max_proc(1), |_, _| 0);
    assert_eq!(result, Err(BootError::Spawn(ProcessError::ResourceExhausted)));
}
